//! OAuth token lifecycle: value type, refresh, persistence hook, ownership.

pub mod manager;
pub mod persist;
pub mod refresh;
pub mod token;

pub use manager::TokenManager;
pub use persist::{on_token_refresh, CallbackPersister, NoopPersister, TokenPersister};
pub use refresh::{ClientAuthMethod, OAuthTokenClient, TokenEndpoint, TokenRefresher};
pub use token::{ProviderRouting, Tokens};
