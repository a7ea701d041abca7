use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::trace;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

/// A server issued Digest nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub value: String,
    pub issued_at: DateTime<Utc>,
}

/// Registry of issued Digest nonces.
///
/// Owned by whoever builds the Digest middleware and shared through an `Arc`
/// when several routes should accept each other's nonces. Every operation is
/// a single atomic map access. Expired entries are removed when they are
/// looked up, by [`NonceStore::purge_expired`], and by a sweep that
/// [`NonceStore::issue`] runs at most once per half TTL.
///
/// By default a live nonce may be reused until it expires. With
/// `single_use(true)` a nonce is redeemed by its first successful request.
pub struct NonceStore {
    nonces: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    single_use: bool,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self {
            nonces: DashMap::new(),
            ttl: Duration::minutes(30),
            clock: Arc::new(SystemClock),
            single_use: false,
            last_sweep: Mutex::new(None),
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

    pub fn single_use(mut self, single_use: bool) -> Self {
        self.single_use = single_use;
        self
    }

    pub fn is_single_use(&self) -> bool {
        self.single_use
    }

    /// Creates and records a fresh nonce.
    pub fn issue(&self) -> Nonce {
        let now = self.clock.now();
        self.sweep_if_due(now);
        let nonce = Nonce {
            value: Uuid::new_v4().simple().to_string(),
            issued_at: now,
        };
        self.nonces.insert(nonce.value.clone(), nonce.issued_at);
        trace!(nonce = %nonce.value, "issued digest nonce");
        nonce
    }

    /// Records a nonce issued elsewhere, e.g. by another process sharing a
    /// realm.
    pub fn insert(&self, value: impl Into<String>, issued_at: DateTime<Utc>) {
        self.nonces.insert(value.into(), issued_at);
    }

    /// True while the nonce is known and younger than the TTL. An expired
    /// nonce is evicted.
    pub fn is_valid(&self, value: &str) -> bool {
        let Some(issued_at) = self.nonces.get(value).map(|entry| *entry.value()) else {
            return false;
        };
        if self.clock.now() - issued_at < self.ttl {
            return true;
        }
        self.nonces.remove_if(value, |_, at| *at == issued_at);
        false
    }

    /// Marks a nonce as used by a successful request. In single-use mode this
    /// removes it and returns false when another request got there first.
    pub fn redeem(&self, value: &str) -> bool {
        if !self.single_use {
            return true;
        }
        self.nonces.remove(value).is_some()
    }

    fn sweep_if_due(&self, now: DateTime<Utc>) {
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if last_sweep.is_some_and(|at| now - at < self.ttl / 2) {
                return;
            }
            *last_sweep = Some(now);
        }
        let dropped = self.purge_expired();
        if dropped > 0 {
            trace!(dropped, "swept expired digest nonces");
        }
    }

    /// Removes every expired nonce and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.nonces.len();
        self.nonces.retain(|_, issued_at| now - *issued_at < self.ttl);
        before.saturating_sub(self.nonces.len())
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl Default for NonceStore {
    fn default() -> Self {
        Self::new()
    }
}
