//! Pluggable HTTP authentication middleware: Basic, Bearer, Digest, mutual
//! TLS, the OAuth2 client flows and OpenID Connect, plus scope checks.
//!
//! Every scheme implements [`Authenticator`] and becomes middleware through
//! [`AuthLayer`]. Layers are stacked on a [`Pipeline`] in front of the
//! application handler. The pipeline and the HTTP types it carries live in
//! this crate, so no web framework is needed to mount a layer:
//!
//! ```rust
//! use starberry_auth::prelude::*;
//!
//! async fn handler(mut ctx: HttpReqCtx) -> HttpReqCtx {
//!     ctx.response = text_response("hello");
//!     ctx
//! }
//!
//! let pipeline = Pipeline::new(handler)
//!     .layer(BearerAuth::new(|token: &str| token == "let-me-in").into_layer())
//!     .layer(RequireScopes::all(["read"]));
//! assert_eq!(pipeline.len(), 2);
//! ```

pub mod app;
pub mod basic;
pub mod bearer;
pub mod clock;
pub mod credential;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod extensions;
pub mod http;
pub mod layer;
pub mod mtls;
pub mod oauth2;
#[cfg(feature = "openid")]
pub mod openid;
pub mod scope;
pub mod session;
pub mod store;
pub mod token;
pub mod url_encoding;
pub mod validators;

pub use app::middleware::{AsyncMiddleware, Pipeline};
pub use basic::BasicAuth;
pub use bearer::BearerAuth;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::Credential;
pub use digest::{DigestAuth, NonceStore};
pub use error::AuthError;
pub use http::{HttpMethod, HttpReqCtx, HttpRequest, HttpResponse, PeerCertificate, StatusCode};
pub use layer::{AuthDecision, AuthLayer, AuthenticatedUser, Authenticator, UnauthorizedHandler};
pub use mtls::MtlsAuth;
pub use scope::{RequireScopes, has_all_scopes, has_any_scopes};
pub use token::{Token, TokenField};

pub mod prelude {
    pub use crate::app::middleware::{AsyncMiddleware, Pipeline};
    pub use crate::basic::BasicAuth;
    pub use crate::bearer::BearerAuth;
    pub use crate::digest::{DigestAuth, NonceStore};
    pub use crate::error::AuthError;
    pub use crate::http::request::request_templates::*;
    pub use crate::http::response::response_templates::*;
    pub use crate::http::{HttpMethod, HttpReqCtx, HttpRequest, HttpResponse, StatusCode};
    pub use crate::layer::{AuthDecision, AuthLayer, Authenticator};
    pub use crate::mtls::MtlsAuth;
    pub use crate::scope::RequireScopes;
    pub use crate::session::{CookieSession, HeaderSession};
    pub use crate::store::{InMemoryStateStore, InMemoryTokenStore};
    pub use crate::token::Token;
}
