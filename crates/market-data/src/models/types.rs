use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical ticker - stable internal identifier, independent of any
/// provider's own symbol spelling (e.g. "US10Y", "DXY").
pub type Ticker = String;

/// Provider-specific symbol spelling (e.g. "DGS10", "^spx", "dx.f").
pub type ProviderSymbol = String;

/// Where an indicator value came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceId {
    Fred,
    Stooq,
    Finnhub,
    AlphaVantage,
    /// Computed by the derived indicator engine.
    Derived,
    /// No route exists for the ticker.
    #[default]
    Unknown,
}

impl SourceId {
    /// Constant identifier used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fred => "FRED",
            Self::Stooq => "STOOQ",
            Self::Finnhub => "FINNHUB",
            Self::AlphaVantage => "ALPHA_VANTAGE",
            Self::Derived => "DERIVED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// US equity trading session an observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    Regular,
    Pre,
    Post,
    Close,
    /// Not available - the value could not be obtained.
    #[default]
    Na,
}

/// Freshness of a value returned by the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheState {
    /// Fetched during this call.
    Live,
    /// Served from an unexpired cache entry.
    Cached,
    /// Served from an expired entry or the last-known-good store.
    Stale,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "LIVE"),
            Self::Cached => write!(f, "CACHED"),
            Self::Stale => write!(f, "STALE"),
        }
    }
}
