use std::error::Error as StdError;
use std::fmt;

use serde_json::json;
use tracing::warn;

use crate::http::response::HttpResponse;
use crate::http::response::response_templates::json_response;
use crate::http::StatusCode;
use crate::oauth2::device::DeviceCode;

/// Every way an authentication or authorization step can deny a request.
///
/// None of these are fatal: each maps to an HTTP status through
/// [`AuthError::status`] and to a JSON body through [`AuthError::into_response`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// No credential of the expected scheme was presented.
    MissingCredential,
    /// A credential was presented but could not be parsed.
    MalformedCredential,
    /// The credential parsed but was rejected by its validator.
    InvalidCredential,
    /// The Digest nonce was never issued or has outlived its TTL.
    ExpiredOrUnknownNonce,
    /// The `state` returned on an authorization callback is unknown.
    StateMismatch,
    /// Token endpoint unreachable, non-200, or undecodable.
    TokenExchangeFailed(String),
    NoTokenInContext,
    InsufficientScope,
    /// The resource owner refused the device authorization.
    AccessDenied,
    DeviceCodeExpired,
    /// The device flow is waiting for the user to approve `user_code`.
    AuthorizationPending(DeviceCode),
    Storage(String),
    Configuration(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::StateMismatch => StatusCode::BAD_REQUEST,
            AuthError::InsufficientScope => StatusCode::FORBIDDEN,
            AuthError::Storage(_) | AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// The machine readable `error` code of the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::ExpiredOrUnknownNonce => "stale_nonce",
            AuthError::StateMismatch => "invalid_state",
            AuthError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthError::NoTokenInContext => "unauthorized",
            AuthError::InsufficientScope => "insufficient_scope",
            AuthError::AccessDenied => "access_denied",
            AuthError::DeviceCodeExpired => "expired_token",
            AuthError::AuthorizationPending(_) => "authorization_pending",
            AuthError::Storage(_) | AuthError::Configuration(_) => "server_error",
        }
    }

    /// Convert this error into a JSON response with the matching status.
    pub fn into_response(&self) -> HttpResponse {
        let status = self.status();
        let code = self.code();
        warn!(error = ?self, error_code = code, http_status = %status, "authentication denied");
        let mut body = json!({ "error": code, "error_description": self.to_string() });
        if let AuthError::AuthorizationPending(device) = self {
            body["user_code"] = json!(device.user_code);
            body["verification_uri"] = json!(device.verification_uri);
            if let Some(complete) = &device.verification_uri_complete {
                body["verification_uri_complete"] = json!(complete);
            }
            body["interval"] = json!(device.interval);
        }
        json_response(status, &body)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "missing credentials"),
            AuthError::MalformedCredential => write!(f, "malformed credentials"),
            AuthError::InvalidCredential => write!(f, "invalid credentials"),
            AuthError::ExpiredOrUnknownNonce => write!(f, "nonce is expired or unknown"),
            AuthError::StateMismatch => write!(f, "invalid state parameter"),
            AuthError::TokenExchangeFailed(msg) => write!(f, "token exchange failed: {}", msg),
            AuthError::NoTokenInContext => write!(f, "no token in context"),
            AuthError::InsufficientScope => write!(f, "insufficient scopes"),
            AuthError::AccessDenied => write!(f, "authorization was denied"),
            AuthError::DeviceCodeExpired => write!(f, "device code expired"),
            AuthError::AuthorizationPending(device) => {
                write!(f, "visit {} and enter code {}", device.verification_uri, device.user_code)
            }
            AuthError::Storage(msg) => write!(f, "storage error: {}", msg),
            AuthError::Configuration(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl StdError for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AuthError::MissingCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::StateMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::InsufficientScope.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::TokenExchangeFailed("status 500".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn response_body_is_json() {
        let resp = AuthError::NoTokenInContext.into_response();
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error_description"], "no token in context");
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }
}
