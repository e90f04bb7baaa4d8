//! Token-managed API client: request pipeline, classification, pagination.

pub mod classify;
pub mod pagination;
mod pipeline;
pub mod request;

pub use classify::{ApiErrorDetail, CallContext};
pub use pagination::{IntoPage, Page, PageCursor};
pub use request::{ApiResponse, Method, RequestBody, RequestSpec, ResponseBody};

use std::fmt;
use std::sync::Arc;

use crate::auth::{OAuthTokenClient, TokenManager, TokenPersister, TokenRefresher, Tokens};
use crate::config::{ClientSettings, OAuthConfig};
use crate::error::SynclineError;
use crate::provider::ProviderAdapter;
use crate::util::clock::{Clock, SystemClock};
use crate::util::retry::RetryPolicy;

/// One provider connection for one set of credentials.
///
/// Cloning is cheap and clones share the same tokens, so a refresh made
/// through one clone is seen by all of them.
///
/// # Example
/// ```no_run
/// use syncline::auth::{on_token_refresh, Tokens};
/// use syncline::client::{ApiClient, RequestSpec};
/// use syncline::config::OAuthConfig;
/// use syncline::provider::crm::CrmAdapter;
///
/// # async fn example() -> syncline::error::Result<()> {
/// let config = OAuthConfig::from_env("CRM")?;
/// let tokens = Tokens::new("access")
///     .with_refresh_token("refresh")
///     .with_routing("instance_url", "https://acme.my.example.com");
///
/// let client = ApiClient::builder(CrmAdapter::new(config.environment), tokens)
///     .with_oauth(config)
///     .on_token_refresh(on_token_refresh(|tokens: Tokens| async move {
///         let _ = tokens; // persist
///         Ok::<_, syncline::error::SynclineError>(())
///     }))
///     .build()?;
///
/// let limits: serde_json::Value = client
///     .execute(RequestSpec::get("/services/data/v59.0/limits"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    adapter: Arc<dyn ProviderAdapter>,
    tokens: Arc<TokenManager>,
    settings: ClientSettings,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("provider", &self.adapter.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ApiClient {
    pub fn builder(adapter: impl ProviderAdapter + 'static, tokens: Tokens) -> ApiClientBuilder {
        ApiClientBuilder::new(Arc::new(adapter), tokens)
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Current access token, without refreshing.
    pub async fn access_token(&self) -> String {
        self.tokens.access_token().await
    }

    pub async fn tokens(&self) -> Tokens {
        self.tokens.tokens().await
    }

    /// Replace the held tokens (e.g. after the user re-connected).
    pub async fn update_tokens(&self, tokens: Tokens) {
        self.tokens.update_tokens(tokens).await;
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    adapter: Arc<dyn ProviderAdapter>,
    tokens: Tokens,
    oauth: Option<OAuthConfig>,
    settings: ClientSettings,
    persister: Option<Arc<dyn TokenPersister>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    clock: Option<Arc<dyn Clock>>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    fn new(adapter: Arc<dyn ProviderAdapter>, tokens: Tokens) -> Self {
        Self {
            adapter,
            tokens,
            oauth: None,
            settings: ClientSettings::default(),
            persister: None,
            refresher: None,
            clock: None,
            http: None,
        }
    }

    /// Enable refresh. Without it the client runs in API-key mode.
    pub fn with_oauth(mut self, config: OAuthConfig) -> Self {
        self.oauth = Some(config);
        self
    }

    pub fn with_settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Hook called with every refreshed credential set.
    pub fn on_token_refresh(mut self, persister: impl TokenPersister + 'static) -> Self {
        self.persister = Some(Arc::new(persister));
        self
    }

    /// Replace the provider token endpoint client.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ApiClient, SynclineError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let http = match self.http {
            Some(http) => http,
            None => build_http_client(&self.settings)?,
        };

        let mut manager = TokenManager::new(self.tokens, clock.clone())
            .with_refresh_buffer(self.settings.refresh_buffer);

        if let Some(config) = self.oauth {
            let refresher: Arc<dyn TokenRefresher> = match self.refresher {
                Some(refresher) => refresher,
                None => {
                    let endpoint = self.adapter.token_endpoint().ok_or_else(|| {
                        SynclineError::Configuration(format!(
                            "provider {} has no OAuth token endpoint",
                            self.adapter.name()
                        ))
                    })?;
                    Arc::new(
                        OAuthTokenClient::new(http.clone(), endpoint)
                            .with_clock(clock.clone())
                            .with_timeout(self.settings.timeout),
                    )
                }
            };
            manager = manager.with_refresher(config, refresher);
        }
        if let Some(persister) = self.persister {
            manager = manager.with_persister(persister);
        }

        Ok(ApiClient {
            http,
            adapter: self.adapter,
            tokens: Arc::new(manager),
            retry: self.settings.retry_policy(),
            settings: self.settings,
            clock,
        })
    }
}

fn build_http_client(settings: &ClientSettings) -> Result<reqwest::Client, SynclineError> {
    let user_agent = settings
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("syncline/{}", env!("CARGO_PKG_VERSION")));
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|err| SynclineError::Configuration(format!("Cannot build HTTP client: {err}")))
}
