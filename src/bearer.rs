use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::extract_bearer;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::http::http_value::header_names;
use crate::http::response::HttpResponse;
use crate::layer::{AuthDecision, Authenticator};
use crate::token::Token;
use crate::validators::TokenValidator;

/// `Authorization: Bearer <token>` checked against a [`TokenValidator`].
/// An accepted token is attached to the context as a bare [`Token`].
pub struct BearerAuth {
    validator: Arc<dyn TokenValidator>,
}

impl BearerAuth {
    pub fn new(validator: impl TokenValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    #[cfg_attr(not(feature = "openid"), allow(dead_code))]
    pub(crate) fn from_shared(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Authenticator for BearerAuth {
    fn scheme(&self) -> &'static str {
        "bearer"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let token = match extract_bearer(&ctx.request) {
            Ok(token) => token,
            Err(err) => return AuthDecision::Deny(err),
        };
        if self.validator.validate(&token).await {
            AuthDecision::Proceed(Some(Token::bearer(token)))
        } else {
            AuthDecision::Deny(AuthError::InvalidCredential)
        }
    }

    async fn challenge(&self, error: &AuthError) -> HttpResponse {
        error
            .into_response()
            .with_header(header_names::WWW_AUTHENTICATE, "Bearer")
    }
}
