//! The token value shared by every OAuth2 and OpenID Connect flow.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An OAuth2 token, optionally carrying an OpenID Connect ID token.
///
/// Deserializes directly from a token endpoint response; `issued_at` and
/// `expires_at` are filled in by [`Token::stamp`]. A missing `expires_at`
/// means the token never expires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds as reported by the issuer.
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Which part of a token a validator is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenField {
    AccessToken,
    IdToken,
}

impl Token {
    /// A bare bearer token as presented in an `Authorization` header.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            ..Default::default()
        }
    }

    /// Decodes a token endpoint response body and stamps it with `now`.
    pub fn from_response(body: &[u8], now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let mut token: Token = serde_json::from_slice(body)?;
        token.stamp(now);
        Ok(token)
    }

    /// Records `now` as the issue time and derives `expires_at` from `expires_in`.
    ///
    /// A lifetime past the representable calendar range leaves the token
    /// without an expiry, the same as a non-expiring one.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.issued_at = Some(now);
        self.expires_at = if self.expires_in > 0 {
            Duration::try_seconds(self.expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
        } else {
            None
        };
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// True iff `now + buffer` is past `expires_at` and a refresh token exists.
    /// Non-expiring tokens never need a refresh.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let horizon = now.checked_add_signed(buffer).unwrap_or(DateTime::<Utc>::MAX_UTC);
                horizon > expires_at && self.has_refresh_token()
            }
            None => false,
        }
    }

    pub fn needs_refresh(&self, buffer: Duration) -> bool {
        self.needs_refresh_at(Utc::now(), buffer)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// The granted scopes, split on spaces.
    pub fn scopes(&self) -> HashSet<&str> {
        self.scope.split(' ').filter(|s| !s.is_empty()).collect()
    }

    pub fn field(&self, field: TokenField) -> Option<&str> {
        match field {
            TokenField::AccessToken => Some(self.access_token.as_str()).filter(|t| !t.is_empty()),
            TokenField::IdToken => self.id_token.as_deref().filter(|t| !t.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn token_expiring_at(expires: Option<DateTime<Utc>>, refresh: Option<&str>) -> Token {
        Token {
            access_token: "a".into(),
            refresh_token: refresh.map(str::to_string),
            expires_at: expires,
            ..Default::default()
        }
    }

    #[test]
    fn refresh_needed_inside_buffer_with_refresh_token() {
        let token = token_expiring_at(Some(at(240)), Some("r"));
        assert!(token.needs_refresh_at(at(0), Duration::minutes(5)));
        assert!(!token.needs_refresh_at(at(0), Duration::minutes(3)));
    }

    #[test]
    fn refresh_never_needed_without_refresh_token() {
        let token = token_expiring_at(Some(at(10)), None);
        assert!(!token.needs_refresh_at(at(100), Duration::minutes(5)));
        let empty = token_expiring_at(Some(at(10)), Some(""));
        assert!(!empty.needs_refresh_at(at(100), Duration::minutes(5)));
    }

    #[test]
    fn non_expiring_token_never_needs_refresh() {
        let token = token_expiring_at(None, Some("r"));
        assert!(!token.needs_refresh_at(at(1_000_000), Duration::minutes(5)));
        assert!(!token.is_expired_at(at(1_000_000)));
    }

    #[test]
    fn stamp_derives_expiry_from_lifetime() {
        let mut token = Token { expires_in: 3600, ..Default::default() };
        token.stamp(at(0));
        assert_eq!(token.issued_at, Some(at(0)));
        assert_eq!(token.expires_at, Some(at(3600)));

        let mut forever = Token::default();
        forever.stamp(at(0));
        assert_eq!(forever.expires_at, None);
    }

    #[test]
    fn from_response_stamps_expiry() {
        let token = Token::from_response(br#"{"access_token":"A","expires_in":120}"#, at(0)).unwrap();
        assert_eq!(token.expires_at, Some(at(120)));
        assert!(Token::from_response(b"not json", at(0)).is_err());
    }

    #[test]
    fn huge_lifetime_does_not_overflow() {
        let token = Token::from_response(br#"{"access_token":"A","expires_in":9223372036854775807}"#, at(0)).unwrap();
        assert_eq!(token.issued_at, Some(at(0)));
        assert_eq!(token.expires_at, None);
        assert!(!token.is_expired_at(at(1_000_000)));

        let mut token = Token { expires_in: 10_000_000_000_000_000, ..Default::default() };
        token.stamp(at(0));
        assert_eq!(token.expires_at, None);
    }

    #[test]
    fn huge_refresh_buffer_does_not_overflow() {
        let token = token_expiring_at(Some(at(10)), Some("r"));
        assert!(token.needs_refresh_at(at(0), Duration::MAX));
    }

    #[test]
    fn scopes_split_on_spaces() {
        let token = Token { scope: "read  write".into(), ..Default::default() };
        let scopes = token.scopes();
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("read") && scopes.contains("write"));
    }

    #[test]
    fn deserializes_token_endpoint_response() {
        let token: Token = serde_json::from_str(
            r#"{"access_token":"A","token_type":"Bearer","expires_in":60,"scope":"openid","id_token":"I"}"#,
        )
        .unwrap();
        assert_eq!(token.field(TokenField::IdToken), Some("I"));
        assert!(token.refresh_token.is_none());
        assert!(token.expires_at.is_none());
    }
}
