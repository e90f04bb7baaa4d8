//! Shared test helpers: a wiremock-backed provider and client wiring.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncline::auth::{on_token_refresh, ClientAuthMethod, TokenEndpoint, Tokens};
use syncline::client::ApiClient;
use syncline::config::{ClientSettings, Environment, OAuthConfig};
use syncline::error::{Result, SynclineError};
use syncline::provider::ProviderAdapter;
use syncline::util::clock::{Clock, ManualClock};

pub const TOKEN_PATH: &str = "/oauth/token";

/// Provider whose API and token endpoint both live on a mock server.
pub struct MockProvider {
    base_url: String,
}

impl MockProvider {
    pub fn new(server: &MockServer) -> Self {
        Self {
            base_url: server.uri(),
        }
    }
}

impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn base_url(&self, _tokens: &Tokens) -> Result<String> {
        Ok(format!("{}/v1", self.base_url))
    }

    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        Some(TokenEndpoint::new(
            format!("{}{TOKEN_PATH}", self.base_url),
            ClientAuthMethod::BasicHeader,
        ))
    }
}

pub fn oauth_config() -> OAuthConfig {
    OAuthConfig::new("client-id", "client-secret", "https://app.test/callback", Environment::Sandbox)
}

/// Fast settings: short timeout, real retry budget.
pub fn test_settings() -> ClientSettings {
    ClientSettings::builder()
        .timeout(Duration::from_millis(200))
        .build()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc::now()))
}

/// Tokens valid for an hour from `clock`'s now.
pub fn fresh_tokens(clock: &ManualClock) -> Tokens {
    Tokens::new("access-1")
        .with_refresh_token("refresh-1")
        .with_expires_at(clock.now() + chrono::Duration::hours(1))
}

/// Collects every credential set passed to the refresh hook.
#[derive(Clone, Default)]
pub struct PersistLog {
    seen: Arc<Mutex<Vec<Tokens>>>,
}

impl PersistLog {
    pub fn tokens(&self) -> Vec<Tokens> {
        self.seen.lock().expect("persist log poisoned").clone()
    }
}

pub fn client_with(
    server: &MockServer,
    tokens: Tokens,
    clock: Arc<ManualClock>,
    settings: ClientSettings,
) -> (ApiClient, PersistLog) {
    let log = PersistLog::default();
    let sink = log.seen.clone();
    let client = ApiClient::builder(MockProvider::new(server), tokens)
        .with_oauth(oauth_config())
        .with_settings(settings)
        .with_clock(clock)
        .on_token_refresh(on_token_refresh(move |tokens: Tokens| {
            let sink = sink.clone();
            async move {
                sink.lock().expect("persist log poisoned").push(tokens);
                Ok::<_, SynclineError>(())
            }
        }))
        .build()
        .expect("client should build");
    (client, log)
}

pub fn client(server: &MockServer, clock: Arc<ManualClock>) -> ApiClient {
    let tokens = fresh_tokens(&clock);
    client_with(server, tokens, clock, test_settings()).0
}

pub async fn mount_token_success(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}
