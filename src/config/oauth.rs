//! OAuth client registration for one provider integration.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SynclineError;

/// Provider environment an integration is registered against.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    Sandbox,
    #[default]
    Production,
}

impl Environment {
    pub fn is_sandbox(self) -> bool {
        self == Self::Sandbox
    }
}

/// OAuth client credentials. Immutable for the lifetime of a client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub environment: Environment,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("environment", &self.environment)
            .finish()
    }
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            environment,
        }
    }

    /// Load from `<PREFIX>_CLIENT_ID`, `<PREFIX>_CLIENT_SECRET`,
    /// `<PREFIX>_REDIRECT_URI` and optional `<PREFIX>_ENVIRONMENT`.
    pub fn from_env(prefix: &str) -> Result<Self, SynclineError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SynclineError> {
        let required = |suffix: &str| {
            let name = format!("{prefix}_{suffix}");
            lookup(&name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SynclineError::Configuration(format!("{name} is not set")))
        };

        let environment = match lookup(&format!("{prefix}_ENVIRONMENT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                SynclineError::Configuration(format!(
                    "{prefix}_ENVIRONMENT must be sandbox or production, got {raw:?}"
                ))
            })?,
            None => Environment::default(),
        };

        Ok(Self {
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            redirect_uri: required("REDIRECT_URI")?,
            environment,
        })
    }
}
