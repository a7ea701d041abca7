//! JWKS caching for RS256 JWT validation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, decode, decode_header};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::jwt::{Claims, validation};
use crate::error::AuthError;
use crate::oauth2::http_client::{ClientRequest, OAuthHttpClient};
use crate::validators::TokenValidator;

/// A JWK as represented in a JWKS endpoint.
#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// When the key set was last downloaded and last asked for.
#[derive(Debug, Default, Clone, Copy)]
struct FetchTimes {
    refreshed: Option<Instant>,
    attempted: Option<Instant>,
}

/// RSA signing keys of an issuer, fetched from its JWKS URI and refreshed
/// when older than the TTL or when a token names an unknown `kid`.
///
/// Fetches are bounded by a timeout and at most one runs at a time. A fetch
/// is not retried sooner than the minimum refetch interval, whatever `kid`
/// the tokens name, so a failing endpoint leaves the previous keys in use.
#[derive(Clone)]
pub struct JwksCache {
    client: Arc<dyn OAuthHttpClient>,
    uri: String,
    keys: Arc<DashMap<String, DecodingKey>>,
    ttl: Duration,
    timeout: Duration,
    min_refetch: Duration,
    times: Arc<Mutex<FetchTimes>>,
    fetch_gate: Arc<AsyncMutex<()>>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwksCache {
    pub fn new(client: Arc<dyn OAuthHttpClient>, uri: impl Into<String>) -> Self {
        Self {
            client,
            uri: uri.into(),
            keys: Arc::new(DashMap::new()),
            ttl: Duration::from_secs(3600),
            timeout: Duration::from_secs(10),
            min_refetch: Duration::from_secs(30),
            times: Arc::new(Mutex::new(FetchTimes::default())),
            fetch_gate: Arc::new(AsyncMutex::new(())),
            issuer: None,
            audience: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Upper bound on one JWKS download.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Minimum time between two downloads triggered by validation.
    pub fn min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch = interval;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn times(&self) -> MutexGuard<'_, FetchTimes> {
        self.times.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-downloads the key set.
    #[instrument(skip(self), fields(uri = %self.uri), level = "debug")]
    pub async fn refresh(&self) -> Result<(), AuthError> {
        self.times().attempted = Some(Instant::now());
        let request = ClientRequest::get(self.uri.clone()).timeout(self.timeout);
        let response = match tokio::time::timeout(self.timeout, self.client.execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, "jwks endpoint unreachable");
                return Err(AuthError::Configuration(format!("jwks fetch failed: {}", err)));
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "jwks endpoint timed out");
                return Err(AuthError::Configuration("jwks fetch timed out".into()));
            }
        };
        if response.status != 200 {
            warn!(status = response.status, "jwks endpoint unavailable");
            return Err(AuthError::Configuration(format!("jwks endpoint returned status {}", response.status)));
        }
        let set: JwkSet = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::Configuration(format!("invalid jwks document: {}", e)))?;
        self.keys.clear();
        for jwk in set.keys {
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            if jwk.kty != "RSA" {
                continue;
            }
            match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => {
                    self.keys.insert(kid, key);
                }
                Err(err) => warn!(kid = %kid, error = %err, "skipping malformed jwk"),
            }
        }
        self.times().refreshed = Some(Instant::now());
        debug!(keys = self.keys.len(), "jwks refreshed");
        Ok(())
    }

    /// Whether looking up `kid` should download the set first.
    fn wants_fetch(&self, kid: &str) -> bool {
        let times = *self.times();
        let stale = times.refreshed.is_none_or(|at| at.elapsed() >= self.ttl);
        let recently_attempted = times.attempted.is_some_and(|at| at.elapsed() < self.min_refetch);
        (stale || !self.keys.contains_key(kid)) && !recently_attempted
    }

    /// The decoding key for `kid`, refreshing the set once if needed.
    pub async fn key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if self.wants_fetch(kid) {
            let _gate = self.fetch_gate.lock().await;
            // Whoever held the gate before may have fetched already.
            if self.wants_fetch(kid) {
                self.refresh().await?;
            }
        }
        self.keys
            .get(kid)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredential)
    }

    pub async fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedCredential)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidCredential);
        }
        let kid = header.kid.ok_or(AuthError::InvalidCredential)?;
        let key = self.key(&kid).await?;
        let validation = validation(Algorithm::RS256, self.issuer.as_deref(), self.audience.as_deref());
        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                AuthError::InvalidCredential
            })
    }
}

#[async_trait]
impl TokenValidator for JwksCache {
    async fn validate(&self, token: &str) -> bool {
        self.decode(token).await.is_ok()
    }
}
