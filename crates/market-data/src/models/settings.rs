use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default refresh interval for the dashboard: five minutes.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Request parameters for one refresh cycle.
///
/// Every field takes part in [`cache_key`](Self::cache_key), so differently
/// parameterized requests never share a cached snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSettings {
    pub refresh_interval_secs: u64,

    pub weight_preset: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe_start: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe_end: Option<NaiveDate>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            weight_preset: "balanced".to_string(),
            timeframe_start: None,
            timeframe_end: None,
        }
    }
}

impl FetchSettings {
    /// Snapshot cache key derived from every setting.
    pub fn cache_key(&self) -> String {
        let bound = |d: &Option<NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "snapshot:r={}:w={}:tf={}..{}",
            self.refresh_interval_secs,
            self.weight_preset,
            bound(&self.timeframe_start),
            bound(&self.timeframe_end),
        )
    }

    /// Snapshot TTL. A zero interval still caches for one second so that
    /// concurrent callers coalesce.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}
