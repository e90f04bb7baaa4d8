//! Classified API failures shared by every provider integration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Broad failure class used to route retry and recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Caller or input error. Never retried.
    Validation,
    /// Unauthorized, forbidden, or a dead refresh token.
    Auth,
    NotFound,
    /// Provider throttling. Retried after the provider-supplied delay.
    RateLimit,
    /// 5xx from the provider.
    Server,
    /// DNS, connect, timeout, or cancellation.
    Transport,
}

impl ErrorKind {
    /// Whether a failure of this kind may be retried within one `execute` call.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Server | Self::Transport)
    }
}

/// A raw HTTP response or transport failure mapped onto [`ErrorKind`].
///
/// Plain data: two classifications of the same input compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error{}: {message}", status_suffix(.http_status))]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub provider_code: Option<String>,
    pub message: String,
    /// Only set for [`ErrorKind::RateLimit`].
    pub retry_after_secs: Option<u64>,
    /// Only meaningful for [`ErrorKind::Auth`].
    pub requires_reauthorization: bool,
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (status {status})"))
        .unwrap_or_default()
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            provider_code: None,
            message: message.into(),
            retry_after_secs: None,
            requires_reauthorization: false,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(
                ErrorKind::RateLimit,
                format!("rate limited, retry after {retry_after_secs}s"),
            )
        }
    }

    /// Auth failure where the token is valid but the call is not allowed.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Auth failure that only a new OAuth consent can resolve.
    pub fn reauthorization_required(message: impl Into<String>) -> Self {
        Self {
            requires_reauthorization: true,
            ..Self::new(ErrorKind::Auth, message)
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_provider_code(mut self, code: Option<String>) -> Self {
        self.provider_code = code;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Token is valid but lacks permission or scope.
    pub fn is_forbidden(&self) -> bool {
        self.kind == ErrorKind::Auth
            && !self.requires_reauthorization
            && self.http_status == Some(403)
    }

    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.kind {
            ErrorKind::Auth if self.requires_reauthorization => RecoverySuggestion::Reauthorize,
            ErrorKind::Auth => RecoverySuggestion::CheckPermissions,
            ErrorKind::Validation => RecoverySuggestion::FixRequest,
            ErrorKind::NotFound => RecoverySuggestion::CheckResource,
            ErrorKind::RateLimit | ErrorKind::Server | ErrorKind::Transport => {
                RecoverySuggestion::RetryLater
            }
        }
    }
}

/// Suggested caller action for a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Send the user back through the OAuth consent flow.
    Reauthorize,
    CheckPermissions,
    FixRequest,
    CheckResource,
    /// Re-run the surrounding business operation later.
    RetryLater,
    CheckConfiguration,
    ContactSupport,
}
