use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::CacheState;

/// Roughly 30 years. Stands in for "never" when a duration overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating at a far-future instant instead of panicking.
pub(crate) fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// A TTL-bound cache entry. Retained after expiry until overwritten.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: Instant,
    pub expires_at: Instant,
    /// Wall-clock creation time, for diagnostics only.
    pub created_at_utc: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(data: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            expires_at: deadline(now, ttl),
            created_at_utc: Utc::now(),
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn state(&self, now: Instant) -> CacheState {
        if self.is_fresh(now) {
            CacheState::Cached
        } else {
            CacheState::Stale
        }
    }
}

/// Last-known-good value. Never expires; only the next successful fetch
/// replaces it.
#[derive(Clone, Debug)]
pub struct LkgEntry<T> {
    pub data: T,
    pub created_at: Instant,
}

/// A value handed out by the cache store together with its freshness.
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub state: CacheState,
    pub age: Duration,
}

impl<T> Cached<T> {
    pub(crate) fn live(data: T) -> Self {
        Self {
            data,
            state: CacheState::Live,
            age: Duration::ZERO,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.state == CacheState::Stale
    }

    pub fn age_secs(&self) -> u64 {
        self.age.as_secs()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            data: f(self.data),
            state: self.state,
            age: self.age,
        }
    }
}

/// Per-key view exposed by [`CacheStore::diagnostics`](super::CacheStore::diagnostics).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeyInfo {
    pub key: String,
    pub state: CacheState,
    pub age_secs: u64,
    pub expires_in_secs: u64,
    pub created_at: DateTime<Utc>,
    pub has_lkg: bool,
}

/// Read-only operational view of a cache store.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDiagnostics {
    pub name: String,
    pub entry_count: usize,
    pub lkg_count: usize,
    pub in_flight: usize,
    pub keys: Vec<String>,
    pub entries: Vec<CacheKeyInfo>,
}
