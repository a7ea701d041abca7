//! OpenID Connect on top of the OAuth2 authorization code engine.

pub mod discovery;
pub mod jwks;
pub mod jwt;
pub mod oidc;

pub use discovery::OidcDiscovery;
pub use jwks::JwksCache;
pub use jwt::{Claims, JwtValidator};
pub use oidc::{OidcAuth, OidcMode};
