use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::ReasonCode;
use super::types::{ProviderSymbol, SourceId};
use crate::errors::MarketDataError;

/// Values extracted from one provider response, before they enter the
/// shared [`Indicator`](super::Indicator) model.
#[derive(Clone, Debug, PartialEq)]
pub struct RawQuote {
    /// Latest value (price, yield, level).
    pub value: f64,

    /// Prior close the latest value is compared against.
    pub prev_value: f64,

    /// Observation time, when the provider reports one.
    pub as_of: Option<DateTime<Utc>>,
}

/// Result of parsing a provider payload.
///
/// Every provider parser returns this instead of panicking or leaking
/// provider-specific shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseOutcome {
    Parsed(RawQuote),
    Failed { code: ReasonCode, reason: String },
}

impl ParseOutcome {
    pub fn failed(code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::Failed {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// Turn a parse result into a cacheable quote, or into the error that
    /// drives the adapter's next step.
    pub fn into_quote(
        self,
        source: SourceId,
        symbol: &str,
        end_of_day: bool,
    ) -> Result<SourceQuote, MarketDataError> {
        let (code, reason) = match self {
            Self::Parsed(raw) => return Ok(SourceQuote::from_raw(source, symbol, raw, end_of_day)),
            Self::Failed { code, reason } => (code, reason),
        };

        let provider = source.to_string();
        Err(match code {
            ReasonCode::RateLimited => MarketDataError::RateLimited {
                provider,
                message: reason,
            },
            ReasonCode::ProviderUnavailable => MarketDataError::ProviderUnavailable {
                provider,
                message: reason,
            },
            ReasonCode::NotFound => MarketDataError::SymbolNotFound {
                provider,
                symbol: symbol.to_string(),
            },
            ReasonCode::NetworkError => MarketDataError::Network {
                provider,
                message: reason,
            },
            _ => MarketDataError::ParseError {
                provider,
                message: reason,
            },
        })
    }
}

/// A provider quote for one provider symbol, as stored in the quote cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuote {
    pub source: SourceId,

    pub symbol: ProviderSymbol,

    pub value: f64,

    pub prev_value: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,

    /// The provider only publishes end-of-day observations.
    pub end_of_day: bool,
}

impl SourceQuote {
    pub fn from_raw(
        source: SourceId,
        symbol: impl Into<ProviderSymbol>,
        raw: RawQuote,
        end_of_day: bool,
    ) -> Self {
        Self {
            source,
            symbol: symbol.into(),
            value: raw.value,
            prev_value: raw.prev_value,
            as_of: raw.as_of,
            end_of_day,
        }
    }
}
