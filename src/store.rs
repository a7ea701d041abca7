//! Persistence seams for pending authorizations and issued tokens.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::token::Token;

/// An authorization redirect that has been issued but not yet called back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    /// PKCE verifier, present when the redirect carried a code challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Keeps `state` values between the redirect and the callback.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn save(&self, pending: PendingAuthorization) -> Result<(), AuthError>;

    /// Removes and returns the pending authorization for `state`. A state can
    /// be redeemed once.
    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>, AuthError>;
}

/// Keeps tokens keyed by a caller-defined session id.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn get(&self, session_id: &str) -> Result<Option<Token>, AuthError>;
    async fn save(&self, session_id: &str, token: Token) -> Result<(), AuthError>;
    async fn delete(&self, session_id: &str) -> Result<(), AuthError>;
}

/// Process-local `StateStore`. Entries older than the TTL are treated as
/// absent and dropped on the next write.
#[derive(Clone)]
pub struct InMemoryStateStore {
    pending: Arc<DashMap<String, PendingAuthorization>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            ttl: Duration::minutes(10),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every entry past its TTL.
    pub fn purge_expired(&self) {
        let cutoff = self.clock.now() - self.ttl;
        self.pending.retain(|_, pending| pending.created_at > cutoff);
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, pending: PendingAuthorization) -> Result<(), AuthError> {
        self.purge_expired();
        self.pending.insert(pending.state.clone(), pending);
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>, AuthError> {
        let cutoff = self.clock.now() - self.ttl;
        Ok(self
            .pending
            .remove(state)
            .map(|(_, pending)| pending)
            .filter(|pending| pending.created_at > cutoff))
    }
}

/// Process-local `TokenStore`.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<DashMap<String, Token>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, session_id: &str) -> Result<Option<Token>, AuthError> {
        Ok(self.tokens.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, session_id: &str, token: Token) -> Result<(), AuthError> {
        self.tokens.insert(session_id.to_string(), token);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), AuthError> {
        self.tokens.remove(session_id);
        Ok(())
    }
}
