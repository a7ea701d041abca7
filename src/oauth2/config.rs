use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;

use super::http_client::{OAuthHttpClient, default_http_client};
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;

/// Settings shared by every OAuth2 flow.
///
/// ```rust
/// use starberry_auth::oauth2::OAuth2Config;
///
/// let config = OAuth2Config::new("my-app", "https://idp.example/token")
///     .client_secret("s3cret")
///     .scopes(["read", "write"]);
/// assert_eq!(config.scope_param(), "read write");
/// ```
#[derive(Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Lead time before expiry at which a token is refreshed.
    pub refresh_buffer: Duration,
    /// Upper bound for each outbound call to the authorization server.
    pub timeout: StdDuration,
    pub http_client: Arc<dyn OAuthHttpClient>,
    pub clock: Arc<dyn Clock>,
}

impl OAuth2Config {
    pub fn new(client_id: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            token_url: token_url.into(),
            scopes: Vec::new(),
            refresh_buffer: Duration::minutes(5),
            timeout: StdDuration::from_secs(10),
            http_client: default_http_client(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn http_client(mut self, client: impl OAuthHttpClient) -> Self {
        self.http_client = Arc::new(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scopes joined with spaces, as sent in `scope` parameters.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    #[cfg_attr(not(feature = "openid"), allow(dead_code))]
    pub(crate) fn ensure_scope(&mut self, scope: &str) {
        if !self.scopes.iter().any(|s| s == scope) {
            self.scopes.insert(0, scope.to_string());
        }
    }
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("refresh_buffer", &self.refresh_buffer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// File or environment driven client settings, e.g. loaded from a JSON
/// config section. Endpoint fields a given flow does not use may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub device_authorization_url: Option<String>,
    #[serde(default)]
    pub issuer_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub refresh_buffer_secs: Option<i64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientSettings {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::Configuration(e.to_string()))
    }

    /// Builds the shared flow settings. The token URL falls back to
    /// `issuer_url + "/token"` when only an issuer is configured.
    pub fn to_config(&self) -> Result<OAuth2Config, AuthError> {
        if self.client_id.is_empty() {
            return Err(AuthError::Configuration("client_id is required".into()));
        }
        let token_url = match (&self.token_url, &self.issuer_url) {
            (Some(url), _) => url.clone(),
            (None, Some(issuer)) => format!("{}/token", issuer.trim_end_matches('/')),
            (None, None) => return Err(AuthError::Configuration("token_url is required".into())),
        };
        let mut config = OAuth2Config::new(self.client_id.clone(), token_url).scopes(self.scopes.clone());
        config.client_secret = self.client_secret.clone();
        if let Some(secs) = self.refresh_buffer_secs {
            config.refresh_buffer = Duration::seconds(secs);
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = StdDuration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn require(&self, field: &str, value: &Option<String>) -> Result<String, AuthError> {
        value
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::Configuration(format!("{} is required", field)))
    }
}
