use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::OAuth2Config;
use crate::error::AuthError;
use crate::http::HttpRequest;
use crate::session::SessionIdExtractor;
use crate::store::TokenStore;
use crate::token::Token;

/// Coalesces refreshes of the same session into one token endpoint call.
///
/// The first request to find a stale token performs the refresh while later
/// ones wait on a per-session lock and then read the refreshed token back
/// from the store.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with a refresh in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn refresh(
        &self,
        config: &OAuth2Config,
        store: &dyn TokenStore,
        session_id: &str,
        stale: &Token,
    ) -> Result<Token, AuthError> {
        let lock = self
            .in_flight
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(config, store, session_id, stale).await
        };
        drop(lock);
        self.in_flight
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn refresh_locked(
        &self,
        config: &OAuth2Config,
        store: &dyn TokenStore,
        session_id: &str,
        stale: &Token,
    ) -> Result<Token, AuthError> {
        let now = config.clock.now();
        if let Some(current) = store.get(session_id).await? {
            if current.access_token != stale.access_token && !current.needs_refresh_at(now, config.refresh_buffer) {
                debug!(session_id, "token already refreshed by a concurrent request");
                return Ok(current);
            }
        }
        let refresh_token = stale
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidCredential)?;
        let mut token = config.token_endpoint().refresh(refresh_token).await?;
        // Refresh responses usually omit the ID token; the session keeps its own.
        if token.id_token.as_deref().is_none_or(str::is_empty) {
            token.id_token = stale.id_token.clone();
        }
        store.save(session_id, token.clone()).await?;
        debug!(session_id, "token refreshed");
        Ok(token)
    }
}

/// Token persistence as the flows use it: a store, the session key derivation
/// and refresh coordination.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn TokenStore>,
    sessions: Arc<dyn SessionIdExtractor>,
    coordinator: RefreshCoordinator,
}

impl TokenCache {
    pub fn new(store: impl TokenStore, sessions: impl SessionIdExtractor) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(sessions))
    }

    pub fn from_shared(store: Arc<dyn TokenStore>, sessions: Arc<dyn SessionIdExtractor>) -> Self {
        Self {
            store,
            sessions,
            coordinator: RefreshCoordinator::new(),
        }
    }

    pub fn session_id(&self, request: &HttpRequest) -> Option<String> {
        self.sessions.session_id(request)
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The usable cached token of a session, refreshed first when it is
    /// inside the refresh buffer. Expired tokens that cannot be refreshed
    /// count as absent.
    pub async fn load(&self, config: &OAuth2Config, session_id: &str) -> Result<Option<Token>, AuthError> {
        let Some(token) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        let now = config.clock.now();
        if token.needs_refresh_at(now, config.refresh_buffer) {
            return match self
                .coordinator
                .refresh(config, self.store.as_ref(), session_id, &token)
                .await
            {
                Ok(fresh) => Ok(Some(fresh)),
                Err(err) => {
                    warn!(session_id, error = %err, "token refresh failed");
                    Err(err)
                }
            };
        }
        if token.is_expired_at(now) {
            debug!(session_id, "cached token expired");
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub async fn save(&self, session_id: &str, token: Token) -> Result<(), AuthError> {
        self.store.save(session_id, token).await
    }
}
