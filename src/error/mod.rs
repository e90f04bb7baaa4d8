//! Error types for Syncline.

pub mod classified;

pub use classified::{ClassifiedError, ErrorKind, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Syncline operations.
#[derive(Error, Debug)]
pub enum SynclineError {
    /// A provider call (resource or token endpoint) failed.
    #[error(transparent)]
    Api(#[from] ClassifiedError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The token persistence hook failed. Hooks should return this variant;
    /// any other error they return is wrapped into it before logging.
    #[error("Token persistence failed: {0}")]
    Persistence(String),

    /// A successful response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SynclineError {
    /// The classified API failure, if this error came from a provider call.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.classified().map(|err| err.kind)
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        self.classified().is_some_and(ClassifiedError::is_retryable)
    }

    /// Whether the end user must redo the OAuth consent flow.
    pub fn requires_reauthorization(&self) -> bool {
        self.classified()
            .is_some_and(|err| err.requires_reauthorization)
    }

    /// This error as a [`SynclineError::Persistence`], keeping its message.
    pub fn into_persistence(self) -> Self {
        match self {
            Self::Persistence(_) => self,
            other => Self::Persistence(other.to_string()),
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::Api(err) => err.recovery_suggestion(),
            Self::Configuration(_) => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SynclineError>;
