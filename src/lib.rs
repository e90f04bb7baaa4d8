//! Syncline: resilient, token-managed REST client core
//!
//! One request pipeline shared by every third-party integration: OAuth token
//! refresh, per-attempt timeouts, retry with exponential backoff and jitter,
//! rate-limit aware delays, a single error taxonomy, and lazy pagination.
//! Providers plug in through [`provider::ProviderAdapter`].
//!
//! # Quick Start
//!
//! ```no_run
//! use syncline::prelude::*;
//! use syncline::provider::accounting::{AccountingAdapter, AccountingClient};
//!
//! # async fn example() -> syncline::error::Result<()> {
//! let config = OAuthConfig::from_env("ACCOUNTING")?;
//! let tokens = Tokens::new("access")
//!     .with_refresh_token("refresh")
//!     .with_routing("realm_id", "9130350");
//!
//! let api = ApiClient::builder(AccountingAdapter::new(config.environment), tokens)
//!     .with_oauth(config)
//!     .with_settings(ClientSettings::from_env()?)
//!     .build()?;
//!
//! let customer = AccountingClient::new(api).get_customer("58").await?;
//! println!("{:?}", customer.display_name);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod util;
