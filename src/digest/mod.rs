//! HTTP Digest authentication (RFC 2617, MD5, `qop=auth`).

mod nonce;

pub use nonce::{Nonce, NonceStore};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::debug;

use crate::credential::{DigestParams, extract_digest};
use crate::crypto::constant_time_eq;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::http::http_value::header_names;
use crate::http::response::HttpResponse;
use crate::layer::{AuthDecision, AuthenticatedUser, Authenticator};
use crate::url_encoding::escape_quoted;
use crate::validators::PasswordLookup;

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Computes the `response` value a client must send for `params`.
///
/// With `qop`, `nc` and `cnonce` all present the RFC 2617 form is used,
/// otherwise the legacy RFC 2069 form `MD5(HA1:nonce:HA2)`.
pub fn expected_response(params: &DigestParams, method: &str, password: &str) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", params.username, params.realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, params.uri));
    match (&params.qop, &params.nc, &params.cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, params.nonce, nc, cnonce, qop, ha2
        )),
        _ => md5_hex(&format!("{}:{}:{}", ha1, params.nonce, ha2)),
    }
}

/// Digest authentication middleware.
pub struct DigestAuth {
    realm: String,
    passwords: Arc<dyn PasswordLookup>,
    nonces: Arc<NonceStore>,
    accept_request_target: bool,
}

impl DigestAuth {
    pub fn new(passwords: impl PasswordLookup) -> Self {
        Self {
            realm: "Restricted".to_string(),
            passwords: Arc::new(passwords),
            nonces: Arc::new(NonceStore::new()),
            accept_request_target: false,
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Uses a fresh private nonce store with the given TTL. Call before
    /// [`DigestAuth::nonce_store`] if both are used, since this replaces the store.
    pub fn nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonces = Arc::new(NonceStore::new().ttl(ttl));
        self
    }

    /// Shares an existing nonce store.
    pub fn nonce_store(mut self, nonces: Arc<NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Also accepts a `uri` equal to the raw request target, query included.
    /// Off by default, where `uri` must equal the request path exactly.
    pub fn accept_request_target(mut self, accept: bool) -> Self {
        self.accept_request_target = accept;
        self
    }

    pub fn nonces(&self) -> &Arc<NonceStore> {
        &self.nonces
    }

    /// A `WWW-Authenticate` value carrying a newly issued nonce.
    pub fn challenge_header(&self) -> String {
        let nonce = self.nonces.issue();
        format!(
            "Digest realm=\"{}\", nonce=\"{}\", algorithm=MD5, qop=\"auth\"",
            escape_quoted(&self.realm),
            nonce.value
        )
    }

    async fn verify(&self, ctx: &HttpReqCtx) -> Result<String, AuthError> {
        let params = extract_digest(&ctx.request)?;
        if params.realm != self.realm {
            return Err(AuthError::InvalidCredential);
        }
        let uri_matches = params.uri == ctx.request.path
            || (self.accept_request_target && params.uri == ctx.request.target());
        if !uri_matches {
            return Err(AuthError::InvalidCredential);
        }
        let password = self
            .passwords
            .lookup(&params.username, &self.realm)
            .await
            .ok_or(AuthError::InvalidCredential)?;
        if !self.nonces.is_valid(&params.nonce) {
            return Err(AuthError::ExpiredOrUnknownNonce);
        }
        let expected = expected_response(&params, ctx.method().as_str(), &password);
        if !constant_time_eq(expected.as_bytes(), params.response.as_bytes()) {
            return Err(AuthError::InvalidCredential);
        }
        if !self.nonces.redeem(&params.nonce) {
            return Err(AuthError::ExpiredOrUnknownNonce);
        }
        Ok(params.username)
    }
}

#[async_trait]
impl Authenticator for DigestAuth {
    fn scheme(&self) -> &'static str {
        "digest"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        match self.verify(ctx).await {
            Ok(username) => {
                debug!(username = %username, realm = %self.realm, "digest response accepted");
                ctx.params.set(AuthenticatedUser(username));
                AuthDecision::Proceed(None)
            }
            Err(err) => AuthDecision::Deny(err),
        }
    }

    async fn challenge(&self, error: &AuthError) -> HttpResponse {
        error
            .into_response()
            .with_header(header_names::WWW_AUTHENTICATE, self.challenge_header())
    }
}
