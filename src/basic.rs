use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::extract_basic;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::http::http_value::header_names;
use crate::http::response::HttpResponse;
use crate::layer::{AuthDecision, AuthenticatedUser, Authenticator};
use crate::url_encoding::escape_quoted;
use crate::validators::CredentialValidator;

/// HTTP Basic authentication (RFC 7617).
pub struct BasicAuth {
    realm: String,
    validator: Arc<dyn CredentialValidator>,
}

impl BasicAuth {
    pub fn new(validator: impl CredentialValidator) -> Self {
        Self {
            realm: "Restricted".to_string(),
            validator: Arc::new(validator),
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    fn scheme(&self) -> &'static str {
        "basic"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let creds = match extract_basic(&ctx.request) {
            Ok(creds) => creds,
            Err(err) => return AuthDecision::Deny(err),
        };
        if !self.validator.validate(&creds.username, &creds.password).await {
            return AuthDecision::Deny(AuthError::InvalidCredential);
        }
        ctx.params.set(AuthenticatedUser(creds.username));
        AuthDecision::Proceed(None)
    }

    async fn challenge(&self, error: &AuthError) -> HttpResponse {
        error.into_response().with_header(
            header_names::WWW_AUTHENTICATE,
            format!("Basic realm=\"{}\"", escape_quoted(&self.realm)),
        )
    }
}
