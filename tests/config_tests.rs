//! Tests for layered client settings and OAuth registration loading.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use pretty_assertions::assert_eq;

use syncline::config::{ClientSettings, Environment, OAuthConfig};
use syncline::error::SynclineError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const SETTINGS_ENV_VARS: [&str; 8] = [
    "SYNCLINE_TIMEOUT_SECS",
    "SYNCLINE_MAX_RETRIES",
    "SYNCLINE_INITIAL_BACKOFF_MS",
    "SYNCLINE_MAX_BACKOFF_MS",
    "SYNCLINE_JITTER_RATIO",
    "SYNCLINE_REFRESH_BUFFER_SECS",
    "SYNCLINE_DEFAULT_RETRY_AFTER_SECS",
    "SYNCLINE_USER_AGENT",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_settings_env() -> EnvGuard {
    let guard = EnvGuard::capture(&SETTINGS_ENV_VARS);
    for key in SETTINGS_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn missing_settings_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ClientSettings::load_from_path(dir.path().join("syncline.toml")).unwrap();
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn settings_file_is_loaded_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "timeout_secs = 12\nmax_backoff_ms = 5000\njitter_ratio = 0.1\ndefault_retry_after_secs = 15"
    )
    .unwrap();

    let settings = ClientSettings::load_from_path(file.path()).unwrap();

    assert_eq!(settings.timeout, Duration::from_secs(12));
    assert_eq!(settings.max_backoff, Duration::from_secs(5));
    assert_eq!(settings.jitter_ratio, 0.1);
    assert_eq!(settings.default_retry_after_secs, 15);
    assert_eq!(settings.max_retries, 3);

    let policy = settings.retry_policy();
    assert_eq!(policy.max_backoff, Duration::from_secs(5));
}

#[test]
fn malformed_settings_file_is_a_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "timeout_secs = \"thirty\"").unwrap();

    let err = ClientSettings::load_from_path(file.path()).unwrap_err();
    assert!(matches!(err, SynclineError::Configuration(_)));
}

#[test]
fn load_overlays_environment_on_file() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_settings_env();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "timeout_secs = 12\nmax_retries = 1").unwrap();
    std::env::set_var("SYNCLINE_MAX_RETRIES", "5");
    std::env::set_var("SYNCLINE_USER_AGENT", "acme-sync/1.0");

    let settings = ClientSettings::load(file.path()).unwrap();

    assert_eq!(settings.timeout, Duration::from_secs(12));
    assert_eq!(settings.max_retries, 5);
    assert_eq!(settings.user_agent.as_deref(), Some("acme-sync/1.0"));
}

#[test]
fn from_env_rejects_unparseable_values() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_settings_env();
    std::env::set_var("SYNCLINE_JITTER_RATIO", "lots");

    let err = ClientSettings::from_env().unwrap_err();
    assert!(matches!(err, SynclineError::Configuration(msg) if msg.contains("SYNCLINE_JITTER_RATIO")));
}

#[test]
fn oauth_config_from_env_reads_prefixed_variables() {
    let _env_lock = env_lock_guard();
    let keys = [
        "DOCSIGN_CLIENT_ID",
        "DOCSIGN_CLIENT_SECRET",
        "DOCSIGN_REDIRECT_URI",
        "DOCSIGN_ENVIRONMENT",
    ];
    let _env_guard = EnvGuard::capture(&keys);
    std::env::set_var("DOCSIGN_CLIENT_ID", "integration-key");
    std::env::set_var("DOCSIGN_CLIENT_SECRET", "secret");
    std::env::set_var("DOCSIGN_REDIRECT_URI", "https://app.example.com/oauth/callback");
    std::env::set_var("DOCSIGN_ENVIRONMENT", "sandbox");

    let config = OAuthConfig::from_env("DOCSIGN").unwrap();

    assert_eq!(config.client_id, "integration-key");
    assert_eq!(config.redirect_uri, "https://app.example.com/oauth/callback");
    assert_eq!(config.environment, Environment::Sandbox);
}

#[test]
fn oauth_config_rejects_unknown_environment() {
    let err = OAuthConfig::from_lookup("QBO", |name| match name {
        "QBO_CLIENT_ID" => Some("id".to_string()),
        "QBO_CLIENT_SECRET" => Some("secret".to_string()),
        "QBO_REDIRECT_URI" => Some("https://cb".to_string()),
        "QBO_ENVIRONMENT" => Some("staging".to_string()),
        _ => None,
    })
    .unwrap_err();

    assert!(matches!(err, SynclineError::Configuration(msg) if msg.contains("staging")));
}

#[test]
fn environment_defaults_to_production() {
    let config = OAuthConfig::from_lookup("CRM", |name| match name {
        "CRM_CLIENT_ID" => Some("id".to_string()),
        "CRM_CLIENT_SECRET" => Some("secret".to_string()),
        "CRM_REDIRECT_URI" => Some("https://cb".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.environment, Environment::Production);
    assert!(!config.environment.is_sandbox());
}
