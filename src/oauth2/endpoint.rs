use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::config::OAuth2Config;
use super::http_client::{ClientRequest, ClientResponse};
use crate::error::AuthError;
use crate::token::Token;

/// `{"error": ..., "error_description": ...}` as returned by token endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body).ok().filter(|e| !e.error.is_empty())
    }
}

/// Calls against the token endpoint of an [`OAuth2Config`].
pub struct TokenEndpoint<'a> {
    config: &'a OAuth2Config,
}

impl OAuth2Config {
    pub fn token_endpoint(&self) -> TokenEndpoint<'_> {
        TokenEndpoint { config: self }
    }
}

impl TokenEndpoint<'_> {
    /// Trades an authorization code for a token.
    #[instrument(skip(self, code, code_verifier), level = "debug")]
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone().unwrap_or_default()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }
        self.request_token(&self.config.token_url, &form).await
    }

    /// Exchanges a refresh token. When the response carries no new refresh
    /// token the old one is kept.
    #[instrument(skip(self, refresh_token), level = "debug")]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.config.client_id.clone()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        let mut token = self.request_token(&self.config.token_url, &form).await?;
        if !token.has_refresh_token() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn client_credentials(&self) -> Result<Token, AuthError> {
        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone().unwrap_or_default()),
        ];
        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scope_param()));
        }
        self.request_token(&self.config.token_url, &form).await
    }

    /// POSTs a form and decodes a `200` answer into a stamped [`Token`].
    pub async fn request_token(&self, url: &str, form: &[(&str, String)]) -> Result<Token, AuthError> {
        let response = self.post_form(url, form).await?;
        if response.status != 200 {
            let detail = OAuthErrorBody::parse(&response.body)
                .map(|e| e.error)
                .unwrap_or_default();
            warn!(status = response.status, error = %detail, url, "token endpoint rejected request");
            return Err(AuthError::TokenExchangeFailed(format!(
                "token endpoint returned status {} {}",
                response.status, detail
            )
            .trim_end()
            .to_string()));
        }
        let token = Token::from_response(&response.body, self.config.clock.now()).map_err(|e| {
            warn!(error = %e, url, "undecodable token response");
            AuthError::TokenExchangeFailed(format!("undecodable token response: {}", e))
        })?;
        if token.access_token.is_empty() {
            return Err(AuthError::TokenExchangeFailed("token response without access_token".into()));
        }
        debug!(url, expires_in = token.expires_in, "token issued");
        Ok(token)
    }

    /// POSTs a form and returns the raw response, bounded by the configured
    /// timeout. Dropping the returned future cancels the call.
    pub async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<ClientResponse, AuthError> {
        let request = ClientRequest::form_post(url, form).timeout(self.config.timeout);
        let call = self.config.http_client.execute(request);
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                warn!(error = %err, url, "token endpoint unreachable");
                Err(AuthError::TokenExchangeFailed(err.to_string()))
            }
            Err(_) => {
                warn!(url, timeout = ?self.config.timeout, "token endpoint timed out");
                Err(AuthError::TokenExchangeFailed("request timed out".into()))
            }
        }
    }
}
