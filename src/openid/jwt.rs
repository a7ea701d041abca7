//! JWT validation for ID tokens and JWT access tokens.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AuthError;
use crate::validators::TokenValidator;

/// Registered claims plus everything else the issuer put in the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Builds the `Validation` shared by the static and JWKS validators.
pub(crate) fn validation(algorithm: Algorithm, issuer: Option<&str>, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }
    validation
}

/// Validates JWTs signed with a fixed key.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    algorithm: Algorithm,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtValidator {
    /// HS256 with a shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
        }
    }

    /// RS256 with a PEM encoded public key.
    pub fn rs256_pem(public_key_pem: &[u8]) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| AuthError::Configuration(format!("invalid RSA public key: {}", e)))?;
        Ok(Self {
            key,
            algorithm: Algorithm::RS256,
            issuer: None,
            audience: None,
        })
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = validation(self.algorithm, self.issuer.as_deref(), self.audience.as_deref());
        decode::<Claims>(token, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                AuthError::InvalidCredential
            })
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn sign(claims: Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    #[test]
    fn accepts_valid_token_and_exposes_claims() {
        let exp = Utc::now().timestamp() + 600;
        let token = sign(json!({"sub": "u1", "exp": exp, "iss": "https://idp", "aud": "app", "email": "u@x"}));
        let claims = JwtValidator::hs256(b"secret")
            .issuer("https://idp")
            .audience("app")
            .decode(&token)
            .unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.extra["email"], "u@x");
    }

    #[test]
    fn rejects_wrong_issuer_secret_or_expiry() {
        let exp = Utc::now().timestamp() + 600;
        let token = sign(json!({"sub": "u1", "exp": exp, "iss": "https://idp"}));
        assert!(JwtValidator::hs256(b"secret").issuer("https://other").decode(&token).is_err());
        assert!(JwtValidator::hs256(b"wrong").decode(&token).is_err());

        let expired = sign(json!({"sub": "u1", "exp": Utc::now().timestamp() - 3600}));
        assert_eq!(JwtValidator::hs256(b"secret").decode(&expired), Err(AuthError::InvalidCredential));
    }
}
