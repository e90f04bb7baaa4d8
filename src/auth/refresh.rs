//! OAuth token endpoint exchanges.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use serde::Deserialize;
use tracing::debug;

use crate::client::classify::{
    classify_response, classify_transport, parse_oauth_error, CallContext, RawResponse,
};
use crate::config::OAuthConfig;
use crate::error::{ClassifiedError, SynclineError};
use crate::util::clock::{Clock, SystemClock};
use crate::util::retry::DEFAULT_RETRY_AFTER_SECS;
use crate::util::timeout::with_timeout;

use super::token::{ProviderRouting, Tokens};

/// Exchanges a refresh token for a new credential set.
///
/// Implementations fail with an [`ErrorKind::Auth`](crate::error::ErrorKind::Auth)
/// error carrying `requires_reauthorization = true` when the provider rejects
/// the refresh token itself; any other failure is transient.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        config: &OAuthConfig,
        refresh_token: &str,
        routing: &ProviderRouting,
    ) -> Result<Tokens, SynclineError>;
}

/// Where the OAuth client credentials go on a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMethod {
    /// `Authorization: Basic base64(client_id:client_secret)`.
    BasicHeader,
    /// `client_id` and `client_secret` form fields.
    RequestBody,
}

/// Provider token endpoint description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoint {
    pub token_url: String,
    pub client_auth: ClientAuthMethod,
    /// Token response fields copied into [`Tokens::routing`].
    pub routing_fields: Vec<&'static str>,
    /// Lifetime assumed when the response omits `expires_in`.
    pub default_expires_in: Option<Duration>,
}

impl TokenEndpoint {
    pub fn new(token_url: impl Into<String>, client_auth: ClientAuthMethod) -> Self {
        Self {
            token_url: token_url.into(),
            client_auth,
            routing_fields: Vec::new(),
            default_expires_in: None,
        }
    }

    pub fn with_routing_fields(mut self, fields: &[&'static str]) -> Self {
        self.routing_fields = fields.to_vec();
        self
    }

    pub fn with_default_expires_in(mut self, lifetime: Duration) -> Self {
        self.default_expires_in = Some(lifetime);
        self
    }
}

/// `POST /oauth/token` client for the `refresh_token` and
/// `authorization_code` grants.
///
/// # Example
/// ```no_run
/// use syncline::auth::{ClientAuthMethod, OAuthTokenClient, TokenEndpoint};
/// use syncline::config::{Environment, OAuthConfig};
///
/// # async fn example() -> syncline::error::Result<()> {
/// let endpoint = TokenEndpoint::new("https://auth.example.com/oauth/token", ClientAuthMethod::BasicHeader);
/// let client = OAuthTokenClient::new(reqwest::Client::new(), endpoint);
/// let config = OAuthConfig::new("id", "secret", "https://app/callback", Environment::Sandbox);
/// let tokens = client.exchange_code(&config, "code-from-redirect").await?;
/// # Ok(())
/// # }
/// ```
pub struct OAuthTokenClient {
    http: reqwest::Client,
    endpoint: TokenEndpoint,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl OAuthTokenClient {
    pub fn new(http: reqwest::Client, endpoint: TokenEndpoint) -> Self {
        Self {
            http,
            endpoint,
            clock: Arc::new(SystemClock),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }

    /// Exchange an authorization code from the OAuth redirect.
    pub async fn exchange_code(
        &self,
        config: &OAuthConfig,
        code: &str,
    ) -> Result<Tokens, SynclineError> {
        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", config.redirect_uri.clone()),
        ];
        self.request_tokens(config, form, None, &ProviderRouting::new())
            .await
    }

    async fn request_tokens(
        &self,
        config: &OAuthConfig,
        mut form: Vec<(&'static str, String)>,
        previous_refresh_token: Option<&str>,
        routing: &ProviderRouting,
    ) -> Result<Tokens, SynclineError> {
        let mut request = self
            .http
            .post(&self.endpoint.token_url)
            .header(ACCEPT, "application/json");

        match self.endpoint.client_auth {
            ClientAuthMethod::BasicHeader => {
                let credentials =
                    STANDARD.encode(format!("{}:{}", config.client_id, config.client_secret));
                request = request.header(AUTHORIZATION, format!("Basic {credentials}"));
            }
            ClientAuthMethod::RequestBody => {
                form.push(("client_id", config.client_id.clone()));
                form.push(("client_secret", config.client_secret.clone()));
            }
        }

        debug!(
            token_url = %self.endpoint.token_url,
            grant_type = form.first().map(|(_, grant)| grant.as_str()).unwrap_or_default(),
            "requesting OAuth tokens"
        );

        let request = request.form(&form);
        let (status, retry_after, body) = with_timeout(self.timeout, None, async {
            let response = request
                .send()
                .await
                .map_err(|err| classify_transport(&err))?;
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response
                .text()
                .await
                .map_err(|err| classify_transport(&err))?;
            Ok::<_, ClassifiedError>((status, retry_after, body))
        })
        .await?;

        let raw = RawResponse {
            status,
            retry_after: retry_after.as_deref(),
            body: &body,
        };
        if let Some(error) = classify_response(
            &raw,
            CallContext::TokenExchange,
            parse_oauth_error(&body),
            DEFAULT_RETRY_AFTER_SECS,
        ) {
            return Err(error.into());
        }

        let payload: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            SynclineError::InvalidResponse(format!("token endpoint returned invalid JSON: {err}"))
        })?;
        self.into_tokens(payload, previous_refresh_token, routing)
    }

    fn into_tokens(
        &self,
        payload: TokenResponse,
        previous_refresh_token: Option<&str>,
        routing: &ProviderRouting,
    ) -> Result<Tokens, SynclineError> {
        if payload.access_token.is_empty() {
            return Err(SynclineError::InvalidResponse(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }

        let lifetime = match payload.expires_in.as_ref() {
            Some(value) => Some(parse_expires_in(value)?),
            None => self.endpoint.default_expires_in,
        };
        let expires_at = lifetime
            .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
            .map(|lifetime| self.clock.now() + lifetime);

        let refresh_token = payload
            .refresh_token
            .filter(|token| !token.is_empty())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let mut routing = routing.clone();
        for field in &self.endpoint.routing_fields {
            if let Some(value) = payload.extra.get(*field).and_then(value_as_string) {
                routing.insert((*field).to_string(), value);
            }
        }

        Ok(Tokens {
            access_token: payload.access_token,
            refresh_token,
            expires_at,
            routing,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenClient {
    async fn refresh(
        &self,
        config: &OAuthConfig,
        refresh_token: &str,
        routing: &ProviderRouting,
    ) -> Result<Tokens, SynclineError> {
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.request_tokens(config, form, Some(refresh_token), routing)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// `expires_in` arrives as a number or a numeric string depending on provider.
fn parse_expires_in(value: &serde_json::Value) -> Result<Duration, SynclineError> {
    let secs = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    secs.map(Duration::from_secs).ok_or_else(|| {
        SynclineError::InvalidResponse(format!("token expires_in is not a duration: {value}"))
    })
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
