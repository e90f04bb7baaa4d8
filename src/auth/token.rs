use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-specific addressing fields (account id, realm id, instance URL).
pub type ProviderRouting = BTreeMap<String, String>;

/// OAuth credential set held by one client.
///
/// `expires_at == None` means the token is not refreshable by time
/// (API-key mode or a provider that issues non-expiring tokens).
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use syncline::auth::Tokens;
///
/// let tokens = Tokens::new("access")
///     .with_refresh_token("refresh")
///     .with_expires_at(Utc::now() + Duration::hours(1))
///     .with_routing("realm_id", "9130");
/// assert_eq!(tokens.routing_value("realm_id"), Some("9130"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub routing: ProviderRouting,
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .field("routing", &self.routing)
            .finish()
    }
}

impl Tokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            routing: ProviderRouting::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_routing(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.routing.insert(key.into(), value.into());
        self
    }

    pub fn routing_value(&self, key: &str) -> Option<&str> {
        self.routing.get(key).map(String::as_str)
    }

    /// A refresh token is present and non-empty.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// `now >= expires_at - buffer`. Always false without an expiry.
    pub fn expires_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::MAX);
        match expires_at.checked_sub_signed(buffer) {
            Some(threshold) => now >= threshold,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_check_respects_buffer() {
        let now = Utc::now();
        let buffer = Duration::from_secs(60);

        let soon = Tokens::new("a").with_expires_at(now + chrono::Duration::seconds(30));
        let later = Tokens::new("a").with_expires_at(now + chrono::Duration::seconds(3600));
        let expired = Tokens::new("a").with_expires_at(now - chrono::Duration::seconds(1));

        assert!(soon.expires_within(now, buffer));
        assert!(!later.expires_within(now, buffer));
        assert!(expired.expires_within(now, buffer));
        assert!(!Tokens::new("a").expires_within(now, buffer));
    }

    #[test]
    fn empty_refresh_token_cannot_refresh() {
        assert!(!Tokens::new("a").can_refresh());
        assert!(!Tokens::new("a").with_refresh_token("").can_refresh());
        assert!(Tokens::new("a").with_refresh_token("r").can_refresh());
    }

    #[test]
    fn serde_round_trip_keeps_routing() {
        let tokens = Tokens::new("a")
            .with_refresh_token("r")
            .with_routing("instance_url", "https://na1.example.com");
        let json = serde_json::to_string(&tokens).unwrap();
        let decoded: Tokens = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn debug_hides_secrets() {
        let tokens = Tokens::new("secret-access").with_refresh_token("secret-refresh");
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
