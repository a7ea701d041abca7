//! Turns a scheme's decision into middleware behaviour.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::app::middleware::{AsyncMiddleware, BoxFuture, Next};
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::http::response::HttpResponse;
use crate::http::response::response_templates::redirect_response;
use crate::token::Token;

/// What a scheme decided about one request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    /// Let the request through, attaching the token if the scheme produced one.
    Proceed(Option<Token>),
    /// Send the user agent to an authorization endpoint.
    Redirect(String),
    /// Refuse the request. The layer answers with the unauthorized handler or
    /// the scheme challenge, except `StateMismatch`, which is always `400`.
    Deny(AuthError),
}

/// The principal a password or certificate scheme authenticated, stored in
/// the request `Params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Replaces the default deny response of a scheme. Receives the request
/// context and the reason for the denial.
pub type UnauthorizedHandler = Arc<dyn Fn(&HttpReqCtx, &AuthError) -> HttpResponse + Send + Sync>;

/// One authentication scheme.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Short scheme name used in logs.
    fn scheme(&self) -> &'static str;

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision;

    /// The scheme's own deny response, including any `WWW-Authenticate` header.
    async fn challenge(&self, error: &AuthError) -> HttpResponse {
        error.into_response()
    }

    fn into_layer(self) -> AuthLayer<Self>
    where
        Self: Sized,
    {
        AuthLayer::new(self)
    }
}

/// Middleware wrapping an [`Authenticator`].
///
/// * `Proceed` stores the token in `ctx.params` and calls the next layer.
/// * `Redirect` answers `302 Found` with `Location`.
/// * `Deny(StateMismatch)` always answers `400`.
/// * Any other denial goes to the unauthorized handler when one is set, or to
///   the scheme challenge.
pub struct AuthLayer<A> {
    authenticator: Arc<A>,
    unauthorized: Option<UnauthorizedHandler>,
}

impl<A: Authenticator> AuthLayer<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            unauthorized: None,
        }
    }

    pub fn on_unauthorized<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HttpReqCtx, &AuthError) -> HttpResponse + Send + Sync + 'static,
    {
        self.unauthorized = Some(Arc::new(handler));
        self
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }
}

impl<A: Authenticator> Clone for AuthLayer<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: self.authenticator.clone(),
            unauthorized: self.unauthorized.clone(),
        }
    }
}

impl<A: Authenticator> AsyncMiddleware for AuthLayer<A> {
    fn handle(&self, mut ctx: HttpReqCtx, next: Next) -> BoxFuture<HttpReqCtx> {
        let authenticator = self.authenticator.clone();
        let unauthorized = self.unauthorized.clone();
        Box::pin(async move {
            let scheme = authenticator.scheme();
            match authenticator.authenticate(&mut ctx).await {
                AuthDecision::Proceed(token) => {
                    debug!(scheme, path = %ctx.path(), "authenticated");
                    if let Some(token) = token {
                        ctx.params.set(token);
                    }
                    next(ctx).await
                }
                AuthDecision::Redirect(location) => {
                    debug!(scheme, path = %ctx.path(), "redirecting to authorization endpoint");
                    ctx.response = redirect_response(location);
                    ctx
                }
                AuthDecision::Deny(error) => {
                    debug!(scheme, path = %ctx.path(), error = %error, "denied");
                    ctx.response = match (&error, unauthorized) {
                        (AuthError::StateMismatch, _) => error.into_response(),
                        (_, Some(handler)) => handler(&ctx, &error),
                        (_, None) => authenticator.challenge(&error).await,
                    };
                    ctx
                }
            }
        })
    }
}
