use std::time::Duration;

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::AuthError;
use crate::oauth2::http_client::{ClientRequest, OAuthHttpClient};

/// Result of parsing /.well-known/openid-configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OidcDiscovery {
    pub fn well_known_url(issuer_url: &str) -> String {
        format!("{}/.well-known/openid-configuration", issuer_url.trim_end_matches('/'))
    }

    /// Fetches the provider metadata and checks that it describes `issuer_url`.
    #[instrument(skip(client), level = "debug")]
    pub async fn fetch(
        issuer_url: &str,
        client: &dyn OAuthHttpClient,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let url = Self::well_known_url(issuer_url);
        let call = client.execute(ClientRequest::get(url.clone()).timeout(timeout));
        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| AuthError::Configuration(format!("discovery at {} timed out", url)))?
            .map_err(|e| AuthError::Configuration(format!("discovery at {} failed: {}", url, e)))?;
        if response.status != 200 {
            warn!(status = response.status, url = %url, "discovery document unavailable");
            return Err(AuthError::Configuration(format!(
                "discovery at {} returned status {}",
                url, response.status
            )));
        }
        let discovery: OidcDiscovery = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::Configuration(format!("invalid discovery document: {}", e)))?;
        if discovery.issuer.trim_end_matches('/') != issuer_url.trim_end_matches('/') {
            return Err(AuthError::Configuration(format!(
                "discovery issuer {} does not match {}",
                discovery.issuer, issuer_url
            )));
        }
        Ok(discovery)
    }
}
