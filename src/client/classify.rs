//! Maps raw HTTP responses and transport failures onto [`ClassifiedError`].
//!
//! Every function here is pure: the same input always classifies the same way.

use serde::Deserialize;

use crate::error::{ClassifiedError, ErrorKind};

const MAX_BODY_IN_MESSAGE: usize = 500;

/// Which kind of endpoint produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContext {
    /// OAuth token endpoint (`refresh_token` / `authorization_code` grants).
    TokenExchange,
    /// Ordinary API resource call.
    Resource,
}

/// Provider error body, as extracted by an adapter's `parse_api_error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorDetail {
    pub message: Option<String>,
    pub code: Option<String>,
    /// Lets a provider body turn a 400 into an auth failure (or a 401 into a
    /// validation failure).
    pub kind_hint: Option<ErrorKind>,
}

/// The parts of an HTTP response the classifier looks at.
#[derive(Debug, Clone, Copy)]
pub struct RawResponse<'a> {
    pub status: u16,
    pub retry_after: Option<&'a str>,
    pub body: &'a str,
}

/// Classify a response. Returns `None` for 2xx.
pub fn classify_response(
    raw: &RawResponse<'_>,
    context: CallContext,
    detail: ApiErrorDetail,
    default_retry_after_secs: u64,
) -> Option<ClassifiedError> {
    let status = raw.status;
    if (200..300).contains(&status) {
        return None;
    }

    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| fallback_message(status, raw.body));

    let error = match (status, context) {
        (429, _) => ClassifiedError {
            message,
            ..ClassifiedError::rate_limited(parse_retry_after(
                raw.retry_after,
                default_retry_after_secs,
            ))
        },
        (500..=599, _) => ClassifiedError::server(message),
        (404, _) => ClassifiedError::not_found(message),
        (400 | 401 | 403, CallContext::TokenExchange) => {
            ClassifiedError::reauthorization_required(message)
        }
        (401 | 403, CallContext::Resource) => match detail.kind_hint {
            Some(ErrorKind::Validation) => ClassifiedError::validation(message),
            _ => ClassifiedError::unauthorized(message),
        },
        (400, CallContext::Resource) => match detail.kind_hint {
            Some(ErrorKind::Auth) => ClassifiedError::unauthorized(message),
            _ => ClassifiedError::validation(message),
        },
        _ => match detail.kind_hint {
            Some(ErrorKind::NotFound) => ClassifiedError::not_found(message),
            Some(ErrorKind::Auth) => ClassifiedError::unauthorized(message),
            _ => ClassifiedError::validation(message),
        },
    };

    Some(error.with_status(status).with_provider_code(detail.code))
}

/// Classify a failure that produced no HTTP response.
pub fn classify_transport(error: &reqwest::Error) -> ClassifiedError {
    // A request that could not be built will fail the same way every time.
    if error.is_builder() {
        return ClassifiedError::validation(format!("invalid request: {error}"));
    }
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        format!("transport failure: {error}")
    };
    let classified = ClassifiedError::transport(message);
    match error.status() {
        Some(status) => classified.with_status(status.as_u16()),
        None => classified,
    }
}

/// Whole seconds from a `Retry-After` header; `default_secs` if absent or
/// unparseable.
pub fn parse_retry_after(value: Option<&str>, default_secs: u64) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default_secs)
}

/// Standard OAuth error body (`error`, `error_description`).
pub fn parse_oauth_error(body: &str) -> ApiErrorDetail {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: Option<String>,
        error_description: Option<String>,
    }

    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(parsed) => ApiErrorDetail {
            message: parsed.error_description.or_else(|| parsed.error.clone()),
            code: parsed.error,
            kind_hint: None,
        },
        Err(_) => ApiErrorDetail::default(),
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("unexpected status")
            .to_string();
    }
    match body.char_indices().nth(MAX_BODY_IN_MESSAGE) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
