use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::capability::Capability;
use super::indicator::Indicator;
use super::types::{CacheState, Ticker};
use super::warning::Warning;

/// Timestamps attached to a snapshot, all in America/New_York.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTimestamps {
    /// Latest observation time across all indicators.
    #[serde(rename = "dataAsOfET")]
    pub data_as_of_et: DateTime<FixedOffset>,

    /// When the caller received this snapshot. Refreshed on cache hits.
    #[serde(rename = "pulledAtET")]
    pub pulled_at_et: DateTime<FixedOffset>,

    /// When the batch was actually fetched.
    #[serde(rename = "builtAtET")]
    pub built_at_et: DateTime<FixedOffset>,
}

/// Everything one refresh cycle produces. This is the full contract
/// consumed by the scoring and presentation layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub indicators: BTreeMap<Ticker, Indicator>,

    pub capabilities: BTreeMap<Ticker, Capability>,

    pub warnings: Vec<Warning>,

    pub cache_state: CacheState,

    pub cache_age_seconds: u64,

    pub timestamps: SnapshotTimestamps,
}

impl IndicatorSnapshot {
    /// Tickers whose capability is ok.
    pub fn available_tickers(&self) -> impl Iterator<Item = &Ticker> {
        self.capabilities
            .iter()
            .filter(|(_, c)| c.ok)
            .map(|(t, _)| t)
    }

    /// Tickers whose capability is not ok.
    pub fn degraded_tickers(&self) -> impl Iterator<Item = &Ticker> {
        self.capabilities
            .iter()
            .filter(|(_, c)| !c.ok)
            .map(|(t, _)| t)
    }
}
