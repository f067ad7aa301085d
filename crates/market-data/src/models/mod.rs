//! Market data models
//!
//! This module contains the core data types for indicator acquisition:
//! - `types` - Identifiers and small enums (Ticker, SourceId, Session, CacheState)
//! - `indicator` - The Indicator handed downstream
//! - `capability` - Capability metadata and ReasonCode
//! - `warning` - User-visible warnings
//! - `quote` - Provider parse results (RawQuote, ParseOutcome, SourceQuote)
//! - `settings` - Refresh cycle parameters (FetchSettings)
//! - `snapshot` - Aggregated output of a refresh cycle (IndicatorSnapshot)

mod capability;
mod indicator;
mod quote;
mod settings;
mod snapshot;
mod types;
mod warning;

pub use capability::{Capability, ReasonCode};
pub use indicator::{percent_change, Indicator};
pub use quote::{ParseOutcome, RawQuote, SourceQuote};
pub use settings::{FetchSettings, DEFAULT_REFRESH_INTERVAL_SECS};
pub use snapshot::{IndicatorSnapshot, SnapshotTimestamps};
pub use types::{CacheState, ProviderSymbol, Session, SourceId, Ticker};
pub use warning::{Warning, WarningCode};
