use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use super::config::OAuth2Config;
use super::endpoint::OAuthErrorBody;
use super::refresh::TokenCache;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::layer::{AuthDecision, Authenticator};
use crate::session::SessionIdExtractor;
use crate::store::TokenStore;
use crate::token::Token;
use crate::validators::TokenValidator;

/// RFC 8628 grant type used when polling the token endpoint.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Extra wait demanded by a `slow_down` answer.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

fn default_interval() -> u64 {
    5
}

/// Device authorization response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code in seconds.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Outcome of a single poll that does not end the flow with an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Issued(Token),
    Pending,
    SlowDown,
}

/// Device Authorization Grant client: requests a device code, then polls the
/// token endpoint until the user approves, denies, or the code expires.
pub struct DeviceFlow {
    config: OAuth2Config,
    device_authorization_url: String,
}

impl DeviceFlow {
    pub fn new(config: OAuth2Config, device_authorization_url: impl Into<String>) -> Self {
        Self {
            config,
            device_authorization_url: device_authorization_url.into(),
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn request_code(&self) -> Result<DeviceCode, AuthError> {
        let mut form = vec![("client_id", self.config.client_id.clone())];
        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scope_param()));
        }
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        let response = self
            .config
            .token_endpoint()
            .post_form(&self.device_authorization_url, &form)
            .await?;
        if response.status != 200 {
            warn!(status = response.status, "device authorization request rejected");
            return Err(AuthError::TokenExchangeFailed(format!(
                "device authorization endpoint returned status {}",
                response.status
            )));
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::TokenExchangeFailed(format!("undecodable device code response: {}", e)))
    }

    /// Asks the token endpoint once whether the user has approved.
    pub async fn poll_once(&self, device: &DeviceCode) -> Result<PollStatus, AuthError> {
        let form = [
            ("grant_type", DEVICE_CODE_GRANT.to_string()),
            ("device_code", device.device_code.clone()),
            ("client_id", self.config.client_id.clone()),
        ];
        let endpoint = self.config.token_endpoint();
        let response = endpoint.post_form(&self.config.token_url, &form).await?;
        if response.status == 200 {
            let token = Token::from_response(&response.body, self.config.clock.now())
                .map_err(|e| AuthError::TokenExchangeFailed(format!("undecodable token response: {}", e)))?;
            return Ok(PollStatus::Issued(token));
        }
        let error = OAuthErrorBody::parse(&response.body).map(|e| e.error);
        match error.as_deref() {
            Some("authorization_pending") => Ok(PollStatus::Pending),
            Some("slow_down") => Ok(PollStatus::SlowDown),
            Some("access_denied") => Err(AuthError::AccessDenied),
            Some("expired_token") => Err(AuthError::DeviceCodeExpired),
            other => Err(AuthError::TokenExchangeFailed(format!(
                "token endpoint returned status {} {}",
                response.status,
                other.unwrap_or_default()
            )
            .trim_end()
            .to_string())),
        }
    }

    /// Polls at the device code's interval until a token is issued or the
    /// flow ends. `slow_down` permanently widens the interval by five seconds.
    #[instrument(skip(self, device), fields(user_code = %device.user_code), level = "debug")]
    ///
    /// A lifetime too large to place on the clock means the code never
    /// expires locally; the provider's `expired_token` still ends the flow.
    pub async fn poll(&self, device: &DeviceCode) -> Result<Token, AuthError> {
        let deadline = Instant::now().checked_add(Duration::from_secs(device.expires_in));
        let mut interval = Duration::from_secs(device.interval.max(1));
        loop {
            sleep(interval).await;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(AuthError::DeviceCodeExpired);
            }
            match self.poll_once(device).await? {
                PollStatus::Issued(token) => return Ok(token),
                PollStatus::Pending => debug!("authorization pending"),
                PollStatus::SlowDown => {
                    interval = interval.saturating_add(SLOW_DOWN_STEP);
                    debug!(interval = ?interval, "asked to slow down");
                }
            }
        }
    }
}

/// Middleware for input-constrained clients using the device flow.
///
/// A session with a usable cached token proceeds. Otherwise a device code is
/// requested once per session and the request is answered `401` with the
/// user code and verification URI, while a background task polls and stores
/// the token when the user approves.
pub struct DeviceAuth {
    flow: Arc<DeviceFlow>,
    validator: Arc<dyn TokenValidator>,
    cache: TokenCache,
    /// One slot per session. Concurrent first requests share the slot, so only
    /// one of them asks the provider for a code.
    pending: Arc<DashMap<String, Arc<OnceCell<DeviceCode>>>>,
}

/// Releases a session's pending slot when its poller finishes or unwinds.
struct PendingGuard {
    pending: Arc<DashMap<String, Arc<OnceCell<DeviceCode>>>>,
    session_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.session_id);
    }
}

impl DeviceAuth {
    pub fn new(
        flow: DeviceFlow,
        validator: impl TokenValidator,
        store: impl TokenStore,
        sessions: impl SessionIdExtractor,
    ) -> Self {
        Self {
            flow: Arc::new(flow),
            validator: Arc::new(validator),
            cache: TokenCache::new(store, sessions),
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn token_cache(mut self, cache: TokenCache) -> Self {
        self.cache = cache;
        self
    }

    /// The device code a session is currently waiting on.
    pub fn pending_for(&self, session_id: &str) -> Option<DeviceCode> {
        self.pending
            .get(session_id)
            .and_then(|entry| entry.value().get().cloned())
    }

    /// The session's device code, requesting one if no request is in flight.
    /// The flag is true for the caller that actually issued the request.
    async fn reserve(&self, session_id: &str) -> Result<(DeviceCode, bool), AuthError> {
        let slot = self.pending.entry(session_id.to_string()).or_default().value().clone();
        let mut issued = false;
        let result = slot
            .get_or_try_init(|| {
                issued = true;
                self.flow.request_code()
            })
            .await
            .cloned();
        match result {
            Ok(device) => Ok((device, issued)),
            Err(err) => {
                self.pending
                    .remove_if(session_id, |_, current| Arc::ptr_eq(current, &slot) && !slot.initialized());
                Err(err)
            }
        }
    }

    fn spawn_poller(&self, session_id: String, device: DeviceCode) {
        let flow = self.flow.clone();
        let cache = self.cache.clone();
        let guard = PendingGuard {
            pending: self.pending.clone(),
            session_id: session_id.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            match flow.poll(&device).await {
                Ok(token) => match cache.save(&session_id, token).await {
                    Ok(()) => info!(session_id = %session_id, "device authorization completed"),
                    Err(err) => warn!(session_id = %session_id, error = %err, "could not store device token"),
                },
                Err(err) => warn!(session_id = %session_id, error = %err, "device authorization ended"),
            }
        });
    }
}

#[async_trait]
impl Authenticator for DeviceAuth {
    fn scheme(&self) -> &'static str {
        "oauth2-device"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let Some(session_id) = self.cache.session_id(&ctx.request) else {
            return AuthDecision::Deny(AuthError::MissingCredential);
        };
        match self.cache.load(self.flow.config(), &session_id).await {
            Ok(Some(token)) => {
                return if self.validator.validate(&token.access_token).await {
                    AuthDecision::Proceed(Some(token))
                } else {
                    AuthDecision::Deny(AuthError::InvalidCredential)
                };
            }
            Ok(None) => {}
            Err(err) => debug!(error = %err, "cached device token unusable"),
        }
        match self.reserve(&session_id).await {
            Ok((device, true)) => {
                self.spawn_poller(session_id, device.clone());
                AuthDecision::Deny(AuthError::AuthorizationPending(device))
            }
            Ok((device, false)) => AuthDecision::Deny(AuthError::AuthorizationPending(device)),
            Err(err) => AuthDecision::Deny(err),
        }
    }
}
