use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::types::{Session, SourceId, Ticker};

/// One market indicator as handed to the scoring and presentation layers.
///
/// `change` and `change_pct` are always derived from `price` and
/// `previous_close`; provider-reported deltas are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub ticker: Ticker,

    pub display_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,

    pub session: Session,

    /// Observation time in America/New_York.
    #[serde(rename = "asOfET", skip_serializing_if = "Option::is_none")]
    pub as_of_et: Option<DateTime<FixedOffset>>,

    pub source: SourceId,

    /// Value comes from a stand-in ticker rather than the logical one.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_proxy: bool,

    /// Value was served from an expired entry or last-known-good data.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_stale: bool,
}

impl Indicator {
    /// Build a populated indicator, computing `change` and `change_pct`.
    pub fn from_values(
        ticker: impl Into<Ticker>,
        display_name: impl Into<String>,
        price: f64,
        previous_close: f64,
        session: Session,
        as_of_et: Option<DateTime<FixedOffset>>,
        source: SourceId,
    ) -> Self {
        let change = price - previous_close;
        Self {
            ticker: ticker.into(),
            display_name: display_name.into(),
            price: Some(price),
            previous_close: Some(previous_close),
            change: Some(change),
            change_pct: Some(percent_change(change, previous_close)),
            session,
            as_of_et,
            source,
            is_proxy: false,
            is_stale: false,
        }
    }

    /// Build a degraded indicator: no price, session `NA`.
    pub fn unavailable(
        ticker: impl Into<Ticker>,
        display_name: impl Into<String>,
        source: SourceId,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            display_name: display_name.into(),
            price: None,
            previous_close: None,
            change: None,
            change_pct: None,
            session: Session::Na,
            as_of_et: None,
            source,
            is_proxy: false,
            is_stale: false,
        }
    }

    pub fn with_proxy(mut self, is_proxy: bool) -> Self {
        self.is_proxy = is_proxy;
        self
    }

    pub fn with_stale(mut self, is_stale: bool) -> Self {
        self.is_stale = is_stale;
        self
    }

    /// Whether both values needed by downstream math are present.
    pub fn has_values(&self) -> bool {
        self.price.is_some() && self.previous_close.is_some()
    }
}

/// `change / base * 100`, or 0 when `base` is zero.
pub fn percent_change(change: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        change / base * 100.0
    }
}
