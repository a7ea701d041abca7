use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::config::OAuth2Config;
use super::refresh::TokenCache;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::layer::{AuthDecision, Authenticator};
use crate::session::SessionIdExtractor;
use crate::store::TokenStore;
use crate::validators::TokenValidator;

/// OAuth2 Client Credentials: machine-to-machine access backed by a cached
/// token per session key.
///
/// A stale token is refreshed. When no token is cached the request is denied
/// unless [`ClientCredentialsAuth::fetch_on_miss`] is enabled, in which case a
/// `client_credentials` grant is performed and its result cached.
pub struct ClientCredentialsAuth {
    config: OAuth2Config,
    validator: Arc<dyn TokenValidator>,
    cache: TokenCache,
    fetch_on_miss: bool,
}

impl ClientCredentialsAuth {
    pub fn new(
        config: OAuth2Config,
        validator: impl TokenValidator,
        store: impl TokenStore,
        sessions: impl SessionIdExtractor,
    ) -> Self {
        Self {
            config,
            validator: Arc::new(validator),
            cache: TokenCache::new(store, sessions),
            fetch_on_miss: false,
        }
    }

    pub fn token_cache(mut self, cache: TokenCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn fetch_on_miss(mut self, enabled: bool) -> Self {
        self.fetch_on_miss = enabled;
        self
    }
}

#[async_trait]
impl Authenticator for ClientCredentialsAuth {
    fn scheme(&self) -> &'static str {
        "oauth2-client-credentials"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let Some(session_id) = self.cache.session_id(&ctx.request) else {
            return AuthDecision::Deny(AuthError::MissingCredential);
        };
        let token = match self.cache.load(&self.config, &session_id).await {
            Ok(Some(token)) => token,
            Ok(None) if self.fetch_on_miss => {
                debug!(session_id = %session_id, "no cached token, requesting one");
                let token = match self.config.token_endpoint().client_credentials().await {
                    Ok(token) => token,
                    Err(err) => return AuthDecision::Deny(err),
                };
                if let Err(err) = self.cache.save(&session_id, token.clone()).await {
                    return AuthDecision::Deny(err);
                }
                token
            }
            Ok(None) => return AuthDecision::Deny(AuthError::MissingCredential),
            Err(err) => return AuthDecision::Deny(err),
        };
        if self.validator.validate(&token.access_token).await {
            AuthDecision::Proceed(Some(token))
        } else {
            AuthDecision::Deny(AuthError::InvalidCredential)
        }
    }
}
