use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::config::OAuth2Config;
use super::refresh::TokenCache;
use super::{AuthorizationRequest, begin_authorization};
use crate::credential::extract_bearer;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::layer::{AuthDecision, Authenticator};
use crate::session::SessionIdExtractor;
use crate::store::{InMemoryStateStore, StateStore, TokenStore};
use crate::token::{Token, TokenField};
use crate::validators::TokenValidator;

/// OAuth2 Authorization Code flow.
///
/// Each request is handled in this order:
/// 1. a callback carrying `code` and `state` is exchanged for a token,
/// 2. a valid `Authorization: Bearer` header is accepted,
/// 3. a cached token of the session is used, refreshed if it is stale,
/// 4. otherwise the user agent is redirected to the authorization endpoint.
pub struct AuthorizationCodeAuth {
    config: OAuth2Config,
    authorization_url: String,
    redirect_url: String,
    validator: Arc<dyn TokenValidator>,
    states: Arc<dyn StateStore>,
    cache: Option<TokenCache>,
    pkce: bool,
    field: TokenField,
    require_id_token: bool,
}

impl AuthorizationCodeAuth {
    pub fn new(
        config: OAuth2Config,
        authorization_url: impl Into<String>,
        redirect_url: impl Into<String>,
        validator: impl TokenValidator,
    ) -> Self {
        Self::from_shared(config, authorization_url, redirect_url, Arc::new(validator))
    }

    pub(crate) fn from_shared(
        config: OAuth2Config,
        authorization_url: impl Into<String>,
        redirect_url: impl Into<String>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let states = InMemoryStateStore::new().clock(config.clock.clone());
        Self {
            config,
            authorization_url: authorization_url.into(),
            redirect_url: redirect_url.into(),
            validator,
            states: Arc::new(states),
            cache: None,
            pkce: false,
            field: TokenField::AccessToken,
            require_id_token: false,
        }
    }

    pub fn state_store(mut self, states: impl StateStore) -> Self {
        self.states = Arc::new(states);
        self
    }

    /// Caches issued tokens per session so later requests need no header.
    pub fn token_store(mut self, store: impl TokenStore, sessions: impl SessionIdExtractor) -> Self {
        self.cache = Some(TokenCache::new(store, sessions));
        self
    }

    pub fn token_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Adds an S256 PKCE challenge to the redirect and the verifier to the
    /// code exchange.
    pub fn pkce(mut self, enabled: bool) -> Self {
        self.pkce = enabled;
        self
    }

    /// Chooses which part of a cached token the validator sees.
    pub fn validate_field(mut self, field: TokenField) -> Self {
        self.field = field;
        self
    }

    /// Rejects token responses without an `id_token` and validates the ID
    /// token right after the exchange.
    #[cfg_attr(not(feature = "openid"), allow(dead_code))]
    pub(crate) fn require_id_token(mut self, required: bool) -> Self {
        self.require_id_token = required;
        self
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    async fn is_valid(&self, token: &Token) -> bool {
        match token.field(self.field) {
            Some(value) => self.validator.validate(value).await,
            None => false,
        }
    }

    #[instrument(skip(self, ctx, code, state), level = "debug")]
    async fn handle_callback(&self, ctx: &mut HttpReqCtx, code: String, state: String) -> AuthDecision {
        let pending = match self.states.take(&state).await {
            Ok(Some(pending)) => pending,
            Ok(None) => return AuthDecision::Deny(AuthError::StateMismatch),
            Err(err) => return AuthDecision::Deny(err),
        };
        let token = match self
            .config
            .token_endpoint()
            .exchange_code(&code, &self.redirect_url, pending.code_verifier.as_deref())
            .await
        {
            Ok(token) => token,
            Err(err) => return AuthDecision::Deny(err),
        };
        if self.require_id_token {
            if token.id_token.as_deref().is_none_or(str::is_empty) {
                warn!("token response carried no id_token");
                return AuthDecision::Deny(AuthError::TokenExchangeFailed("missing id_token".into()));
            }
            if !self.is_valid(&token).await {
                return AuthDecision::Deny(AuthError::InvalidCredential);
            }
        }
        if let Some(cache) = &self.cache {
            match cache.session_id(&ctx.request) {
                Some(session_id) => {
                    if let Err(err) = cache.save(&session_id, token.clone()).await {
                        return AuthDecision::Deny(err);
                    }
                }
                None => debug!("no session id on callback, token not cached"),
            }
        }
        ctx.request.remove_query_param("code");
        ctx.request.remove_query_param("state");
        AuthDecision::Proceed(Some(token))
    }

    async fn redirect(&self) -> AuthDecision {
        let request = AuthorizationRequest {
            authorization_url: &self.authorization_url,
            response_type: "code",
            redirect_url: &self.redirect_url,
            pkce: self.pkce,
        };
        match begin_authorization(&self.config, self.states.as_ref(), request).await {
            Ok(location) => AuthDecision::Redirect(location),
            Err(err) => AuthDecision::Deny(err),
        }
    }
}

#[async_trait]
impl Authenticator for AuthorizationCodeAuth {
    fn scheme(&self) -> &'static str {
        "oauth2-authorization-code"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let code = ctx.request.query_param("code").map(str::to_string);
        let state = ctx.request.query_param("state").map(str::to_string);
        if let (Some(code), Some(state)) = (code, state) {
            return self.handle_callback(ctx, code, state).await;
        }

        if let Ok(bearer) = extract_bearer(&ctx.request) {
            if self.validator.validate(&bearer).await {
                return AuthDecision::Proceed(Some(Token::bearer(bearer)));
            }
            debug!("bearer token rejected");
        }

        if let Some(cache) = &self.cache {
            if let Some(session_id) = cache.session_id(&ctx.request) {
                match cache.load(&self.config, &session_id).await {
                    Ok(Some(token)) => {
                        if self.is_valid(&token).await {
                            return AuthDecision::Proceed(Some(token));
                        }
                        debug!("cached token rejected by validator");
                    }
                    Ok(None) => {}
                    Err(err) => debug!(error = %err, "cached token unusable"),
                }
            }
        }

        self.redirect().await
    }
}
