//! Per-client token ownership and the ensure-valid-token step.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::OAuthConfig;
use crate::error::{ClassifiedError, SynclineError};
use crate::util::clock::Clock;

use super::persist::{NoopPersister, TokenPersister};
use super::refresh::TokenRefresher;
use super::token::Tokens;

/// Owns the [`Tokens`] of one client instance.
///
/// Refreshes are single-flight: concurrent callers that find the same
/// expiring token wait on one refresh (and one persistence-hook call)
/// instead of issuing their own. Callers that queued behind an attempt take
/// its outcome, whether it succeeded or failed.
pub struct TokenManager {
    tokens: RwLock<Tokens>,
    /// Guards refreshes; holds the reauthorization error of the last
    /// completed attempt, if it ended that way.
    refresh_lock: Mutex<Option<ClassifiedError>>,
    /// Bumped under `refresh_lock` whenever an attempt completes or the
    /// tokens are replaced.
    generation: AtomicU64,
    oauth: Option<OAuthConfig>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    persister: Arc<dyn TokenPersister>,
    clock: Arc<dyn Clock>,
    refresh_buffer: Duration,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("oauth", &self.oauth)
            .field("refresher", &self.refresher.as_ref().map(|_| ".."))
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

impl TokenManager {
    /// A manager that never refreshes (API-key mode).
    pub fn new(tokens: Tokens, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(None),
            generation: AtomicU64::new(0),
            oauth: None,
            refresher: None,
            persister: Arc::new(NoopPersister),
            clock,
            refresh_buffer: Duration::from_secs(60),
        }
    }

    pub fn with_refresher(mut self, config: OAuthConfig, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.oauth = Some(config);
        self.refresher = Some(refresher);
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn TokenPersister>) -> Self {
        self.persister = persister;
        self
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Snapshot of the current tokens.
    pub async fn tokens(&self) -> Tokens {
        self.tokens.read().await.clone()
    }

    pub async fn access_token(&self) -> String {
        self.tokens.read().await.access_token.clone()
    }

    /// Replace the held tokens, e.g. after the caller re-ran the OAuth flow.
    ///
    /// Waits for any in-flight refresh so the caller's tokens are not
    /// overwritten by it.
    pub async fn update_tokens(&self, tokens: Tokens) {
        let mut last = self.refresh_lock.lock().await;
        *self.tokens.write().await = tokens;
        *last = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn should_refresh(&self, tokens: &Tokens) -> bool {
        self.refresher.is_some()
            && tokens.can_refresh()
            && tokens.expires_within(self.clock.now(), self.refresh_buffer)
    }

    /// Refresh if the token expires within the buffer, then return the
    /// tokens the request should use.
    ///
    /// Only a refresh rejected with `requires_reauthorization` fails; any
    /// other refresh failure is logged and the current token is returned so
    /// the API call itself surfaces the definitive error.
    pub async fn ensure_fresh(&self) -> Result<Tokens, SynclineError> {
        let current = self.tokens().await;
        if !self.should_refresh(&current) {
            return Ok(current);
        }

        let observed = self.generation.load(Ordering::Acquire);
        let mut last = self.refresh_lock.lock().await;
        let current = self.tokens().await;
        if self.generation.load(Ordering::Acquire) != observed {
            // An attempt finished while we waited: share its outcome.
            debug!("reusing outcome of a concurrent refresh");
            return match last.as_ref() {
                Some(rejected) => Err(rejected.clone().into()),
                None => Ok(current),
            };
        }
        if !self.should_refresh(&current) {
            return Ok(current);
        }

        let outcome = self.refresh_locked(&current).await;
        self.record_outcome(&mut *last, &outcome);

        match outcome {
            Ok(fresh) => Ok(fresh),
            Err(err) if err.requires_reauthorization() => {
                warn!(error = %err, "refresh token rejected; reauthorization required");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; continuing with current token");
                Ok(current)
            }
        }
    }

    /// Refresh unconditionally and propagate every failure.
    pub async fn force_refresh(&self) -> Result<Tokens, SynclineError> {
        let mut last = self.refresh_lock.lock().await;
        let current = self.tokens().await;
        let outcome = self.refresh_locked(&current).await;
        self.record_outcome(&mut *last, &outcome);
        outcome
    }

    fn record_outcome(
        &self,
        last: &mut Option<ClassifiedError>,
        outcome: &Result<Tokens, SynclineError>,
    ) {
        *last = outcome
            .as_ref()
            .err()
            .filter(|err| err.requires_reauthorization())
            .and_then(SynclineError::classified)
            .cloned();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    async fn refresh_locked(&self, current: &Tokens) -> Result<Tokens, SynclineError> {
        let (Some(config), Some(refresher)) = (self.oauth.as_ref(), self.refresher.as_ref()) else {
            return Err(SynclineError::Configuration(
                "client has no OAuth configuration; tokens cannot be refreshed".to_string(),
            ));
        };
        let Some(refresh_token) = current.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(SynclineError::Configuration(
                "no refresh token available".to_string(),
            ));
        };

        let fresh = refresher
            .refresh(config, refresh_token, &current.routing)
            .await?;
        *self.tokens.write().await = fresh.clone();
        info!(expires_at = ?fresh.expires_at, "access token refreshed");

        if let Err(err) = self.persister.persist(&fresh).await {
            let err = err.into_persistence();
            error!(error = %err, "failed to persist refreshed tokens");
        }
        Ok(fresh)
    }
}
