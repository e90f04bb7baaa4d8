//! Provider adapter trait and implementations.
//!
//! An adapter only describes a provider: where its API lives, how requests
//! authenticate, where tokens are exchanged, and how error bodies read.
//! Retries and token refresh belong to [`ApiClient`](crate::client::ApiClient).

#[cfg(feature = "accounting")]
pub mod accounting;
#[cfg(feature = "crm")]
pub mod crm;
#[cfg(feature = "docgen")]
pub mod docgen;
#[cfg(feature = "esignature")]
pub mod esignature;

use serde_json::Value;

use crate::auth::{TokenEndpoint, Tokens};
use crate::client::classify::ApiErrorDetail;
use crate::error::SynclineError;

/// How the access credential is attached to resource requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `<header>: [<prefix> ]<key>`.
    ApiKey {
        header: String,
        prefix: Option<String>,
    },
}

impl AuthScheme {
    /// Header name and value carrying `credential`.
    pub fn header_for(&self, credential: &str) -> (String, String) {
        match self {
            Self::Bearer => ("Authorization".to_string(), format!("Bearer {credential}")),
            Self::ApiKey { header, prefix } => {
                let value = match prefix {
                    Some(prefix) => format!("{prefix} {credential}"),
                    None => credential.to_string(),
                };
                (header.clone(), value)
            }
        }
    }
}

/// Core trait implemented by every provider integration.
pub trait ProviderAdapter: Send + Sync {
    /// Provider name used in logs (e.g., "crm").
    fn name(&self) -> &str;

    /// Base URL that relative request paths are joined onto. May depend on
    /// routing fields carried by the tokens (account, realm, instance).
    fn base_url(&self, tokens: &Tokens) -> Result<String, SynclineError>;

    fn auth_scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    /// OAuth token endpoint. `None` for providers used only in API-key mode.
    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        None
    }

    /// Identity endpoint on the OAuth server, for account discovery.
    fn userinfo_url(&self) -> Option<String> {
        None
    }

    /// Headers sent with every request, before caller overrides.
    fn default_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Extract message, code and kind hint from a non-2xx body.
    fn parse_api_error(&self, _status: u16, body: &str) -> ApiErrorDetail {
        generic_error_detail(body)
    }
}

/// Best-effort reading of common JSON error shapes:
/// `{"message": ..}`, `{"error": "..", "error_description": ..}`,
/// `{"error": {"message": .., "code": ..}}`.
pub fn generic_error_detail(body: &str) -> ApiErrorDetail {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return ApiErrorDetail::default();
    };

    let nested = value.get("error").filter(|error| error.is_object());
    let source = nested.unwrap_or(&value);

    let message = string_field(source, &["message", "error_description", "detail"])
        .or_else(|| string_field(&value, &["error_description", "message"]))
        .or_else(|| value.get("error").and_then(Value::as_str).map(str::to_string));
    let code = string_field(source, &["code", "errorCode", "error_code"])
        .or_else(|| value.get("error").and_then(Value::as_str).map(str::to_string));

    ApiErrorDetail {
        message,
        code,
        kind_hint: None,
    }
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// Routing value required to address the provider, or a configuration error
/// naming what is missing.
pub(crate) fn required_routing<'t>(
    tokens: &'t Tokens,
    provider: &str,
    key: &str,
) -> Result<&'t str, SynclineError> {
    tokens
        .routing_value(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            SynclineError::Configuration(format!("{provider} tokens are missing routing field `{key}`"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_scheme_applies_prefix() {
        let scheme = AuthScheme::ApiKey {
            header: "Authorization".to_string(),
            prefix: Some("API-Key".to_string()),
        };
        assert_eq!(
            scheme.header_for("k-1"),
            ("Authorization".to_string(), "API-Key k-1".to_string())
        );

        let bare = AuthScheme::ApiKey {
            header: "X-Api-Key".to_string(),
            prefix: None,
        };
        assert_eq!(bare.header_for("k-1").1, "k-1");
        assert_eq!(AuthScheme::Bearer.header_for("t").1, "Bearer t");
    }

    #[test]
    fn generic_detail_reads_common_shapes() {
        let flat = generic_error_detail(r#"{"message":"Name is required","code":"MISSING"}"#);
        assert_eq!(flat.message.as_deref(), Some("Name is required"));
        assert_eq!(flat.code.as_deref(), Some("MISSING"));

        let oauth = generic_error_detail(r#"{"error":"invalid_token","error_description":"expired"}"#);
        assert_eq!(oauth.message.as_deref(), Some("expired"));
        assert_eq!(oauth.code.as_deref(), Some("invalid_token"));

        let nested = generic_error_detail(r#"{"error":{"message":"nope","code":42}}"#);
        assert_eq!(nested.message.as_deref(), Some("nope"));
        assert_eq!(nested.code.as_deref(), Some("42"));

        assert_eq!(generic_error_detail("<html>"), ApiErrorDetail::default());
    }

    #[test]
    fn missing_routing_is_a_configuration_error() {
        let tokens = Tokens::new("t").with_routing("realm_id", "");
        let err = required_routing(&tokens, "accounting", "realm_id").unwrap_err();
        assert!(matches!(err, SynclineError::Configuration(message) if message.contains("realm_id")));
    }
}
