//! Per-provider rate-limit cool-down.
//!
//! When a provider signals a quota or rate limit, it is parked for a fixed
//! window. While parked, adapters serve cached or last-known-good values and
//! make no network calls to it.
//!
//! The tracker is in-memory and resets on process restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::deadline;
use crate::models::SourceId;

/// Default time a rate-limited provider stays parked.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Thread-safe cool-down tracker shared by all adapters.
pub struct Cooldown {
    /// Per-provider end of the current cool-down window.
    parked_until: Mutex<HashMap<SourceId, Instant>>,
    period: Duration,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            parked_until: Mutex::new(HashMap::new()),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Lock the state mutex, recovering from poison if necessary.
    ///
    /// The worst case after recovery is a provider parked slightly too long
    /// or too short, which is better than panicking.
    fn lock(&self) -> MutexGuard<'_, HashMap<SourceId, Instant>> {
        self.parked_until.lock().unwrap_or_else(|poisoned| {
            warn!("Cooldown mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Park a provider for one cool-down period, starting now.
    pub fn trip(&self, provider: SourceId) {
        let until = deadline(Instant::now(), self.period);
        let previous = self.lock().insert(provider, until);
        if previous.is_none() {
            info!(
                "Cooldown: parking '{}' for {}s after rate limit",
                provider,
                self.period.as_secs()
            );
        } else {
            debug!("Cooldown: extending cool-down for '{}'", provider);
        }
    }

    /// Time left in the provider's cool-down, if it is parked.
    ///
    /// Expired windows are cleared here.
    pub fn remaining(&self, provider: SourceId) -> Option<Duration> {
        let mut parked = self.lock();
        let until = *parked.get(&provider)?;
        let now = Instant::now();

        if now >= until {
            parked.remove(&provider);
            info!("Cooldown: '{}' is available again", provider);
            return None;
        }
        Some(until - now)
    }

    pub fn is_cooling_down(&self, provider: SourceId) -> bool {
        self.remaining(provider).is_some()
    }

    /// Release a provider immediately.
    pub fn reset(&self, provider: SourceId) {
        if self.lock().remove(&provider).is_some() {
            info!("Cooldown: manually releasing '{}'", provider);
        }
    }

    /// Providers currently parked and the seconds left for each.
    pub fn snapshot(&self) -> Vec<CooldownStatus> {
        let now = Instant::now();
        let mut statuses: Vec<CooldownStatus> = self
            .lock()
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(provider, until)| CooldownStatus {
                provider: *provider,
                remaining_secs: until.saturating_duration_since(now).as_secs(),
            })
            .collect();
        statuses.sort_by_key(|s| s.provider);
        statuses
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    pub provider: SourceId,
    pub remaining_secs: u64,
}
