//! In-memory caching for provider quotes and aggregated snapshots.
//!
//! ```text
//!   EMPTY --fetch ok--> LIVE --time--> CACHED --ttl--> STALE --fetch ok--> LIVE
//!                                                        |
//!                                        fetch failed: serve LKG / stale
//! ```
//!
//! - [`CacheStore`] - TTL store with single-flight and last-known-good fallback
//! - [`Cached`] - A value with its [`CacheState`](crate::models::CacheState) and age
//! - [`CacheDiagnostics`] - Read-only operational view

mod entry;
mod store;

pub(crate) use entry::deadline;
pub use entry::{CacheDiagnostics, CacheEntry, CacheKeyInfo, Cached, LkgEntry};
pub use store::CacheStore;
