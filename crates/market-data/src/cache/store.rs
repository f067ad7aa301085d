//! TTL cache with single-flight request coalescing and a last-known-good
//! shadow store.
//!
//! The store is in-memory and resets on process restart. It exists to
//! mitigate latency and provider rate limits, never as a source of truth.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use tokio::time::Instant;

use super::entry::{CacheDiagnostics, CacheEntry, CacheKeyInfo, Cached, LkgEntry};
use crate::errors::MarketDataError;
use crate::models::CacheState;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, MarketDataError>>>;

/// A fetch currently running for a key. The id tells generations apart so
/// a finished fetch never clears a slot that belongs to a newer one.
struct InFlight<T> {
    id: u64,
    fetch: SharedFetch<T>,
}

struct StoreState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    lkg: HashMap<String, LkgEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
}

impl<T> StoreState<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lkg: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    fn write(&mut self, key: &str, data: T, ttl: Duration)
    where
        T: Clone,
    {
        let entry = CacheEntry::new(data, ttl);
        self.lkg.insert(
            key.to_string(),
            LkgEntry {
                data: entry.data.clone(),
                created_at: entry.created_at,
            },
        );
        self.entries.insert(key.to_string(), entry);
    }
}

/// Lock the store state, recovering from poison if necessary.
///
/// The worst case after a panic elsewhere is a slightly outdated entry,
/// which is better than taking the whole refresh pipeline down.
fn lock_state<T>(state: &Mutex<StoreState<T>>) -> MutexGuard<'_, StoreState<T>> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("Cache store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Clears the in-flight slot when the fetch future finishes, fails, panics
/// or is dropped.
struct InFlightGuard<T> {
    state: Weak<Mutex<StoreState<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = lock_state(&state);
        if state
            .in_flight
            .get(&self.key)
            .is_some_and(|slot| slot.id == self.id)
        {
            state.in_flight.remove(&self.key);
        }
    }
}

/// Generic TTL key-value store.
///
/// Thread-safe; share it behind an `Arc`. Each instance is independent, so
/// tests and callers can run isolated stores side by side.
pub struct CacheStore<T> {
    name: String,
    state: Arc<Mutex<StoreState<T>>>,
    next_id: AtomicU64,
}

impl<T> CacheStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty store. The name only shows up in logs and diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(StoreState::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<T>> {
        lock_state(&self.state)
    }

    /// Read an entry. Unexpired entries are `Cached`, expired ones `Stale`.
    pub fn get(&self, key: &str) -> Option<Cached<T>> {
        let state = self.lock();
        let now = Instant::now();
        state.entries.get(key).map(|entry| Cached {
            data: entry.data.clone(),
            state: entry.state(now),
            age: entry.age(now),
        })
    }

    /// Best value available without fetching: a fresh entry, else the
    /// last-known-good value, else an expired entry.
    pub fn peek(&self, key: &str) -> Option<Cached<T>> {
        let state = self.lock();
        let now = Instant::now();

        if let Some(entry) = state.entries.get(key).filter(|e| e.is_fresh(now)) {
            return Some(Cached {
                data: entry.data.clone(),
                state: CacheState::Cached,
                age: entry.age(now),
            });
        }

        Self::stale_value(&state, key, now)
    }

    /// Write an entry and its last-known-good shadow.
    pub fn set(&self, key: &str, data: T, ttl: Duration) {
        self.lock().write(key, data, ttl);
    }

    /// Drop the TTL entry for a key. The last-known-good value survives.
    pub fn invalidate(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    /// Drop every entry and every last-known-good value.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.lkg.clear();
    }

    /// Fetch through the cache, coalescing concurrent callers.
    ///
    /// - A fresh entry is returned as `Cached` without calling `fetcher`.
    /// - If a fetch for `key` is already running, this call awaits it.
    /// - Otherwise `fetcher` runs once; success is written through and
    ///   returned as `Live`.
    ///
    /// On failure the last-known-good value, then the expired entry, is
    /// returned as `Stale`. Only when neither exists is the error returned.
    pub async fn single_flight<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Duration,
    ) -> Result<Cached<T>, MarketDataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let fetch = {
            let mut state = self.lock();
            let now = Instant::now();

            if let Some(entry) = state.entries.get(key).filter(|e| e.is_fresh(now)) {
                return Ok(Cached {
                    data: entry.data.clone(),
                    state: CacheState::Cached,
                    age: entry.age(now),
                });
            }

            let joined = state.in_flight.get(key).map(|slot| slot.fetch.clone());
            match joined {
                Some(fetch) => {
                    debug!("Cache '{}': joining in-flight fetch for '{}'", self.name, key);
                    fetch
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.spawn_fetch(key, id, fetcher(), ttl);
                    state.in_flight.insert(
                        key.to_string(),
                        InFlight {
                            id,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        match fetch.await {
            Ok(data) => Ok(Cached::live(data)),
            Err(error) => self.fallback(key, error),
        }
    }

    /// Variant for fetchers that report "no data" as `None`.
    ///
    /// `None` is handled exactly like an error, but the final fallback is
    /// `None` instead of an error.
    pub async fn single_flight_with_lkg<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Duration,
    ) -> Option<Cached<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let owned_key = key.to_string();
        let result = self
            .single_flight(
                key,
                move || {
                    let fetch = fetcher();
                    async move { fetch.await.ok_or(MarketDataError::NoData { key: owned_key }) }
                },
                ttl,
            )
            .await;

        match result {
            Ok(cached) => Some(cached),
            Err(error) => {
                debug!("Cache '{}': no value for '{}': {}", self.name, key, error);
                None
            }
        }
    }

    /// Wrap a fetch so it writes through on success and always releases
    /// its in-flight slot.
    fn spawn_fetch<Fut>(&self, key: &str, id: u64, fetch: Fut, ttl: Duration) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let guard = InFlightGuard {
            state: Arc::downgrade(&self.state),
            key: key.to_string(),
            id,
        };
        let state = Arc::downgrade(&self.state);
        let key = key.to_string();

        async move {
            let _guard = guard;
            let result = fetch.await;
            if let (Ok(data), Some(state)) = (&result, state.upgrade()) {
                lock_state(&state).write(&key, data.clone(), ttl);
            }
            result
        }
        .boxed()
        .shared()
    }

    fn fallback(&self, key: &str, error: MarketDataError) -> Result<Cached<T>, MarketDataError> {
        let state = self.lock();
        match Self::stale_value(&state, key, Instant::now()) {
            Some(cached) => {
                warn!(
                    "Cache '{}': fetch for '{}' failed ({}), serving stale value aged {:?}",
                    self.name, key, error, cached.age
                );
                Ok(cached)
            }
            None => Err(error),
        }
    }

    fn stale_value(state: &StoreState<T>, key: &str, now: Instant) -> Option<Cached<T>> {
        if let Some(lkg) = state.lkg.get(key) {
            return Some(Cached {
                data: lkg.data.clone(),
                state: CacheState::Stale,
                age: now.saturating_duration_since(lkg.created_at),
            });
        }
        state.entries.get(key).map(|entry| Cached {
            data: entry.data.clone(),
            state: CacheState::Stale,
            age: entry.age(now),
        })
    }

    /// Number of TTL entries (fresh or expired).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of keys with a TTL entry.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Entry count, keys, and per-key age and state.
    pub fn diagnostics(&self) -> CacheDiagnostics {
        let state = self.lock();
        let now = Instant::now();

        let mut entries: Vec<CacheKeyInfo> = state
            .entries
            .iter()
            .map(|(key, entry)| CacheKeyInfo {
                key: key.clone(),
                state: entry.state(now),
                age_secs: entry.age(now).as_secs(),
                expires_in_secs: entry.expires_at.saturating_duration_since(now).as_secs(),
                created_at: entry.created_at_utc,
                has_lkg: state.lkg.contains_key(key),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheDiagnostics {
            name: self.name.clone(),
            entry_count: entries.len(),
            lkg_count: state.lkg.len(),
            in_flight: state.in_flight.len(),
            keys: entries.iter().map(|e| e.key.clone()).collect(),
            entries,
        }
    }
}
