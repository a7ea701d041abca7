use serde_json::Value;
use starberry_auth::oauth2::DeviceCode;
use starberry_auth::{AuthError, StatusCode};

#[test]
fn test_auth_error_into_response() {
    let cases = vec![
        (AuthError::MissingCredential, StatusCode::UNAUTHORIZED, "missing_credential", "missing credentials"),
        (AuthError::MalformedCredential, StatusCode::UNAUTHORIZED, "malformed_credential", "malformed credentials"),
        (AuthError::InvalidCredential, StatusCode::UNAUTHORIZED, "invalid_credential", "invalid credentials"),
        (AuthError::ExpiredOrUnknownNonce, StatusCode::UNAUTHORIZED, "stale_nonce", "nonce is expired or unknown"),
        (AuthError::StateMismatch, StatusCode::BAD_REQUEST, "invalid_state", "invalid state parameter"),
        (
            AuthError::TokenExchangeFailed("request timed out".into()),
            StatusCode::UNAUTHORIZED,
            "token_exchange_failed",
            "token exchange failed: request timed out",
        ),
        (AuthError::NoTokenInContext, StatusCode::UNAUTHORIZED, "unauthorized", "no token in context"),
        (AuthError::InsufficientScope, StatusCode::FORBIDDEN, "insufficient_scope", "insufficient scopes"),
        (AuthError::AccessDenied, StatusCode::UNAUTHORIZED, "access_denied", "authorization was denied"),
        (AuthError::DeviceCodeExpired, StatusCode::UNAUTHORIZED, "expired_token", "device code expired"),
        (
            AuthError::Storage("redis down".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "storage error: redis down",
        ),
    ];

    for (err, expected_status, expected_code, expected_desc) in cases {
        let resp = err.into_response();
        assert_eq!(resp.status, expected_status, "Status for {:?}", err);
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["error"], expected_code, "Error code for {:?}", err);
        assert_eq!(v["error_description"], expected_desc, "Description for {:?}", err);
    }
}

#[test]
fn test_pending_device_authorization_response() {
    let device = DeviceCode {
        device_code: "dev-1".into(),
        user_code: "WDJB-MJHT".into(),
        verification_uri: "https://idp.local/device".into(),
        verification_uri_complete: Some("https://idp.local/device?user_code=WDJB-MJHT".into()),
        expires_in: 1800,
        interval: 5,
    };
    let resp = AuthError::AuthorizationPending(device).into_response();
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    let v: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(v["error"], "authorization_pending");
    assert_eq!(v["user_code"], "WDJB-MJHT");
    assert_eq!(v["verification_uri"], "https://idp.local/device");
    assert_eq!(v["interval"], 5);
    assert!(v.get("device_code").is_none());
}
