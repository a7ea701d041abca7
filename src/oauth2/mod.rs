//! OAuth2 client side: configuration, token endpoint calls and the flow
//! engines that run as middleware.

pub mod authorization_code;
pub mod client_credentials;
pub mod config;
pub mod device;
pub mod endpoint;
pub mod http_client;
pub mod implicit;
pub mod refresh;

pub use authorization_code::AuthorizationCodeAuth;
pub use client_credentials::ClientCredentialsAuth;
pub use config::{ClientSettings, OAuth2Config};
pub use device::{DeviceAuth, DeviceCode, DeviceFlow, PollStatus};
pub use endpoint::TokenEndpoint;
pub use http_client::{ClientRequest, ClientResponse, InMemoryHttpClient, OAuthHttpClient};
#[cfg(feature = "reqwest")]
pub use http_client::ReqwestHttpClient;
pub use implicit::ImplicitAuth;
pub use refresh::{RefreshCoordinator, TokenCache};

use crate::crypto::{pkce_code_challenge, pkce_code_verifier, random_state};
use crate::error::AuthError;
use crate::store::{PendingAuthorization, StateStore};
use crate::url_encoding::append_query;

/// Parameters of a front-channel redirect to an authorization endpoint.
pub(crate) struct AuthorizationRequest<'a> {
    pub authorization_url: &'a str,
    pub response_type: &'a str,
    pub redirect_url: &'a str,
    pub pkce: bool,
}

/// Generates and stores a fresh `state` (and PKCE verifier) and returns the
/// URL to redirect the user agent to.
pub(crate) async fn begin_authorization(
    config: &OAuth2Config,
    states: &dyn StateStore,
    request: AuthorizationRequest<'_>,
) -> Result<String, AuthError> {
    let state = random_state()?;
    let code_verifier = if request.pkce {
        Some(pkce_code_verifier()?)
    } else {
        None
    };
    let mut params = vec![
        ("response_type", request.response_type.to_string()),
        ("client_id", config.client_id.clone()),
        ("redirect_uri", request.redirect_url.to_string()),
        ("scope", config.scope_param()),
        ("state", state.clone()),
    ];
    if let Some(verifier) = &code_verifier {
        params.push(("code_challenge", pkce_code_challenge(verifier)));
        params.push(("code_challenge_method", "S256".to_string()));
    }
    states
        .save(PendingAuthorization {
            state,
            code_verifier,
            created_at: config.clock.now(),
        })
        .await?;
    Ok(append_query(request.authorization_url, &params))
}
