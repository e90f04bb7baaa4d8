//! Configuration system (layered: defaults < TOML file < environment).

pub mod oauth;

pub use oauth::{Environment, OAuthConfig};

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::error::SynclineError;
use crate::util::retry::{RetryPolicy, DEFAULT_RETRY_AFTER_SECS};

const ENV_PREFIX: &str = "SYNCLINE";

/// Request pipeline tuning shared by every provider client.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use syncline::config::ClientSettings;
///
/// let settings = ClientSettings::builder()
///     .timeout(Duration::from_secs(10))
///     .max_retries(5)
///     .build();
/// assert_eq!(settings.refresh_buffer, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ClientSettings {
    /// Per-attempt timeout, overridable per request.
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
    #[builder(default = 3)]
    pub max_retries: u32,
    #[builder(default = Duration::from_millis(1000))]
    pub initial_backoff: Duration,
    #[builder(default = Duration::from_millis(60_000))]
    pub max_backoff: Duration,
    #[builder(default = 0.3)]
    pub jitter_ratio: f64,
    /// Refresh when the access token expires within this window.
    #[builder(default = Duration::from_secs(60))]
    pub refresh_buffer: Duration,
    /// Used for a 429 without a parseable `Retry-After`.
    #[builder(default = DEFAULT_RETRY_AFTER_SECS)]
    pub default_retry_after_secs: u64,
    #[builder(into)]
    pub user_agent: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            jitter_ratio: self.jitter_ratio,
        }
    }

    /// Defaults overlaid with `SYNCLINE_*` environment variables.
    pub fn from_env() -> Result<Self, SynclineError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut settings = Self::default();
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Layered load: defaults, then the TOML file (if it exists), then env.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SynclineError> {
        let _ = dotenvy::dotenv();
        let mut settings = Self::load_from_path(path)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Load from a TOML file. Returns defaults if the file does not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SynclineError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(SynclineError::Configuration(format!(
                    "Cannot read settings file {}: {err}",
                    path.display()
                )))
            }
        };
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SynclineError> {
        let layer: SettingsLayer = toml::from_str(raw)
            .map_err(|err| SynclineError::Configuration(format!("Invalid settings file: {err}")))?;
        let mut settings = Self::default();
        settings.overlay(layer);
        Ok(settings)
    }

    /// Overlay `SYNCLINE_*` variables from an explicit source.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SynclineError> {
        let layer = SettingsLayer {
            timeout_secs: env_value(&lookup, "TIMEOUT_SECS")?,
            max_retries: env_value(&lookup, "MAX_RETRIES")?,
            initial_backoff_ms: env_value(&lookup, "INITIAL_BACKOFF_MS")?,
            max_backoff_ms: env_value(&lookup, "MAX_BACKOFF_MS")?,
            jitter_ratio: env_value(&lookup, "JITTER_RATIO")?,
            refresh_buffer_secs: env_value(&lookup, "REFRESH_BUFFER_SECS")?,
            default_retry_after_secs: env_value(&lookup, "DEFAULT_RETRY_AFTER_SECS")?,
            user_agent: lookup(&format!("{ENV_PREFIX}_USER_AGENT")),
        };
        self.overlay(layer);
        Ok(())
    }

    fn overlay(&mut self, layer: SettingsLayer) {
        if let Some(secs) = layer.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = layer.max_retries {
            self.max_retries = retries;
        }
        if let Some(ms) = layer.initial_backoff_ms {
            self.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = layer.max_backoff_ms {
            self.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ratio) = layer.jitter_ratio {
            self.jitter_ratio = ratio;
        }
        if let Some(secs) = layer.refresh_buffer_secs {
            self.refresh_buffer = Duration::from_secs(secs);
        }
        if let Some(secs) = layer.default_retry_after_secs {
            self.default_retry_after_secs = secs;
        }
        if layer.user_agent.is_some() {
            self.user_agent = layer.user_agent;
        }
    }
}

/// One configuration layer; unset fields leave the lower layer untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsLayer {
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    jitter_ratio: Option<f64>,
    refresh_buffer_secs: Option<u64>,
    default_retry_after_secs: Option<u64>,
    user_agent: Option<String>,
}

fn env_value<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<T>, SynclineError> {
    let name = format!("{ENV_PREFIX}_{suffix}");
    match lookup(&name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SynclineError::Configuration(format!("{name} has invalid value {raw:?}"))),
        None => Ok(None),
    }
}
