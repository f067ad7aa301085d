use serde::{Deserialize, Serialize};

use super::types::Ticker;

/// Category of a user-visible warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// A derived indicator lost a required component.
    DerivedMissing,
    /// A required base ticker could not be fetched.
    TickerUnavailable,
    /// A routed provider has no credential configured.
    ProviderUnconfigured,
    /// A provider reported a quota or rate limit.
    RateLimited,
    /// At least one value was served from stale or last-known-good data.
    StaleData,
}

/// User-visible warning attached to a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<Ticker>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ticker: None,
        }
    }

    pub fn for_ticker(
        code: WarningCode,
        ticker: impl Into<Ticker>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            ticker: Some(ticker.into()),
        }
    }
}
