use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::config::OAuth2Config;
use super::{AuthorizationRequest, begin_authorization};
use crate::credential::extract_bearer;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::layer::{AuthDecision, Authenticator};
use crate::store::{InMemoryStateStore, StateStore};
use crate::token::Token;
use crate::validators::TokenValidator;

/// Query parameters a client-side script copies over from the URL fragment.
const FRAGMENT_PARAMS: [&str; 5] = ["access_token", "token_type", "expires_in", "scope", "state"];

/// OAuth2 Implicit flow.
///
/// The token arrives either as an `access_token` query parameter (moved there
/// from the URL fragment by client-side script) or as a bearer header. When a
/// `state` accompanies a query token it must be one this layer issued.
pub struct ImplicitAuth {
    config: OAuth2Config,
    authorization_url: String,
    redirect_url: String,
    validator: Arc<dyn TokenValidator>,
    states: Arc<dyn StateStore>,
}

impl ImplicitAuth {
    pub fn new(
        config: OAuth2Config,
        authorization_url: impl Into<String>,
        redirect_url: impl Into<String>,
        validator: impl TokenValidator,
    ) -> Self {
        let states = InMemoryStateStore::new().clock(config.clock.clone());
        Self {
            config,
            authorization_url: authorization_url.into(),
            redirect_url: redirect_url.into(),
            validator: Arc::new(validator),
            states: Arc::new(states),
        }
    }

    pub fn state_store(mut self, states: impl StateStore) -> Self {
        self.states = Arc::new(states);
        self
    }

    /// Builds the context token from the fragment parameters and strips them
    /// from the request.
    fn take_query_token(&self, ctx: &mut HttpReqCtx, access_token: String) -> Token {
        let mut token = Token::bearer(access_token);
        if let Some(token_type) = ctx.request.query_param("token_type") {
            token.token_type = token_type.to_string();
        }
        if let Some(scope) = ctx.request.query_param("scope") {
            token.scope = scope.to_string();
        }
        token.expires_in = ctx
            .request
            .query_param("expires_in")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        token.stamp(self.config.clock.now());
        for param in FRAGMENT_PARAMS {
            ctx.request.remove_query_param(param);
        }
        token
    }
}

#[async_trait]
impl Authenticator for ImplicitAuth {
    fn scheme(&self) -> &'static str {
        "oauth2-implicit"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let query_token = ctx
            .request
            .query_param("access_token")
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if let Some(access_token) = query_token {
            if let Some(state) = ctx.request.query_param("state").map(str::to_string) {
                match self.states.take(&state).await {
                    Ok(Some(_)) => {}
                    Ok(None) => return AuthDecision::Deny(AuthError::StateMismatch),
                    Err(err) => return AuthDecision::Deny(err),
                }
            }
            if self.validator.validate(&access_token).await {
                let token = self.take_query_token(ctx, access_token);
                return AuthDecision::Proceed(Some(token));
            }
            debug!("query access_token rejected");
        } else if let Ok(bearer) = extract_bearer(&ctx.request) {
            if self.validator.validate(&bearer).await {
                return AuthDecision::Proceed(Some(Token::bearer(bearer)));
            }
            debug!("bearer token rejected");
        }

        let request = AuthorizationRequest {
            authorization_url: &self.authorization_url,
            response_type: "token",
            redirect_url: &self.redirect_url,
            pkce: false,
        };
        match begin_authorization(&self.config, self.states.as_ref(), request).await {
            Ok(location) => AuthDecision::Redirect(location),
            Err(err) => AuthDecision::Deny(err),
        }
    }
}
