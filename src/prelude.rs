//! Convenience re-exports for common use.

pub use crate::auth::{on_token_refresh, TokenPersister, Tokens};
pub use crate::client::{ApiClient, ApiResponse, Page, RequestSpec, ResponseBody};
pub use crate::config::{ClientSettings, Environment, OAuthConfig};
pub use crate::error::{ClassifiedError, ErrorKind, Result, SynclineError};
pub use crate::provider::{AuthScheme, ProviderAdapter};
