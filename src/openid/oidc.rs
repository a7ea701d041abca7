use std::sync::Arc;

use async_trait::async_trait;

use super::discovery::OidcDiscovery;
use crate::bearer::BearerAuth;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::http::response::HttpResponse;
use crate::layer::{AuthDecision, Authenticator};
use crate::oauth2::authorization_code::AuthorizationCodeAuth;
use crate::oauth2::config::OAuth2Config;
use crate::session::SessionIdExtractor;
use crate::store::{StateStore, TokenStore};
use crate::token::TokenField;
use crate::validators::TokenValidator;

/// How an [`OidcAuth`] layer operates, chosen when it is built.
pub enum OidcMode {
    /// Only validate a bearer token presented by the client.
    BearerOnly,
    /// Run the authorization code flow against `issuer_url + "/authorize"` and
    /// `issuer_url + "/token"`. The config's `token_url` is replaced.
    Redirect {
        config: OAuth2Config,
        issuer_url: String,
        redirect_url: String,
    },
    /// Run the authorization code flow against discovered endpoints.
    Discovered {
        config: OAuth2Config,
        discovery: OidcDiscovery,
        redirect_url: String,
    },
}

enum Engine {
    Bearer(BearerAuth),
    Redirect(Box<AuthorizationCodeAuth>),
}

/// OpenID Connect authentication.
///
/// In the redirect modes the `openid` scope is always requested, the token
/// response must carry an `id_token`, and the validator is applied to the ID
/// token both after the exchange and on cached tokens.
pub struct OidcAuth {
    engine: Engine,
}

impl OidcAuth {
    pub fn new(mode: OidcMode, validator: impl TokenValidator) -> Self {
        let validator: Arc<dyn TokenValidator> = Arc::new(validator);
        let engine = match mode {
            OidcMode::BearerOnly => Engine::Bearer(BearerAuth::from_shared(validator)),
            OidcMode::Redirect {
                config,
                issuer_url,
                redirect_url,
            } => {
                let issuer = issuer_url.trim_end_matches('/');
                Engine::Redirect(Box::new(redirect_engine(
                    config,
                    format!("{}/authorize", issuer),
                    format!("{}/token", issuer),
                    redirect_url,
                    validator,
                )))
            }
            OidcMode::Discovered {
                config,
                discovery,
                redirect_url,
            } => Engine::Redirect(Box::new(redirect_engine(
                config,
                discovery.authorization_endpoint,
                discovery.token_endpoint,
                redirect_url,
                validator,
            ))),
        };
        Self { engine }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.engine, Engine::Redirect(_))
    }

    /// The underlying authorization code engine in the redirect modes.
    pub fn authorization_code(&self) -> Option<&AuthorizationCodeAuth> {
        match &self.engine {
            Engine::Redirect(engine) => Some(engine.as_ref()),
            Engine::Bearer(_) => None,
        }
    }

    fn map_redirect(mut self, f: impl FnOnce(AuthorizationCodeAuth) -> AuthorizationCodeAuth) -> Self {
        self.engine = match self.engine {
            Engine::Redirect(engine) => Engine::Redirect(Box::new(f(*engine))),
            other => other,
        };
        self
    }

    /// Has no effect in [`OidcMode::BearerOnly`].
    pub fn token_store(self, store: impl TokenStore, sessions: impl SessionIdExtractor) -> Self {
        self.map_redirect(|engine| engine.token_store(store, sessions))
    }

    /// Has no effect in [`OidcMode::BearerOnly`].
    pub fn state_store(self, states: impl StateStore) -> Self {
        self.map_redirect(|engine| engine.state_store(states))
    }

    /// Has no effect in [`OidcMode::BearerOnly`].
    pub fn pkce(self, enabled: bool) -> Self {
        self.map_redirect(|engine| engine.pkce(enabled))
    }
}

fn redirect_engine(
    mut config: OAuth2Config,
    authorization_url: String,
    token_url: String,
    redirect_url: String,
    validator: Arc<dyn TokenValidator>,
) -> AuthorizationCodeAuth {
    config.token_url = token_url;
    config.ensure_scope("openid");
    AuthorizationCodeAuth::from_shared(config, authorization_url, redirect_url, validator)
        .validate_field(TokenField::IdToken)
        .require_id_token(true)
}

#[async_trait]
impl Authenticator for OidcAuth {
    fn scheme(&self) -> &'static str {
        "oidc"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        match &self.engine {
            Engine::Bearer(engine) => engine.authenticate(ctx).await,
            Engine::Redirect(engine) => engine.authenticate(ctx).await,
        }
    }

    async fn challenge(&self, error: &AuthError) -> HttpResponse {
        match &self.engine {
            Engine::Bearer(engine) => engine.challenge(error).await,
            Engine::Redirect(engine) => engine.challenge(error).await,
        }
    }
}
