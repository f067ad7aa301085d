//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining retry behavior
//!
//! Adapters never let these errors escape: they are folded into a
//! [`Capability`](crate::models::Capability) with `ok = false`. Only
//! cache-level failures of a whole batch reach the caller of
//! [`Aggregator::fetch_all`](crate::aggregator::Aggregator::fetch_all).

mod retry;

use std::time::Duration;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::ReasonCode;

/// Errors that can occur during market data operations.
///
/// The enum is `Clone` because a single-flight fetch result is shared by
/// every caller that joined the in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// The provider has no credential configured.
    /// Permanent until configuration changes.
    #[error("Provider unavailable: {provider} - {message}")]
    ProviderUnavailable {
        /// The provider that cannot be used
        provider: String,
        /// Why the provider cannot be used
        message: String,
    },

    /// The provider rate limited the request, either with HTTP 429 or with a
    /// quota marker embedded in an otherwise successful response.
    #[error("Rate limited: {provider} - {message}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// The marker or status that revealed the limit
        message: String,
    },

    /// The payload did not have the expected shape or values.
    #[error("Parse error: {provider} - {message}")]
    ParseError {
        /// The provider that returned the payload
        provider: String,
        /// Description of the parse failure
        message: String,
    },

    /// The provider does not know this symbol spelling.
    #[error("Symbol not found: {provider} - {symbol}")]
    SymbolNotFound {
        /// The provider that was asked
        provider: String,
        /// The provider-specific symbol
        symbol: String,
    },

    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {provider}")]
    HttpStatus {
        /// The provider that answered
        provider: String,
        /// HTTP status code
        status: u16,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A transport error occurred while communicating with a provider.
    #[error("Network error: {provider} - {message}")]
    Network {
        /// The provider being called
        provider: String,
        /// The transport error message
        message: String,
    },

    /// A fetcher completed without producing a value.
    #[error("No data for key: {key}")]
    NoData {
        /// The cache key that was being filled
        key: String,
    },

    /// A whole refresh cycle did not complete within the batch timeout.
    #[error("Batch timed out after {after:?}")]
    BatchTimeout {
        /// The configured batch timeout
        after: Duration,
    },

    /// The routing table or another piece of configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulse_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::HttpStatus { provider: "FRED".to_string(), status: 503 };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::HttpStatus { provider: "FRED".to_string(), status: 404 };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::HttpStatus { status, .. } if *status >= 500 => RetryClass::WithBackoff,
            Self::Timeout { .. } | Self::Network { .. } => RetryClass::WithBackoff,

            Self::RateLimited { .. } => RetryClass::Cooldown,

            Self::ProviderUnavailable { .. }
            | Self::ParseError { .. }
            | Self::SymbolNotFound { .. }
            | Self::HttpStatus { .. }
            | Self::NoData { .. }
            | Self::BatchTimeout { .. }
            | Self::InvalidConfig(_) => RetryClass::Never,
        }
    }

    /// Whether another spelling of the same ticker on the same provider may
    /// succeed where this one failed.
    pub fn tries_next_symbol(&self) -> bool {
        match self {
            Self::SymbolNotFound { .. } | Self::ParseError { .. } | Self::NoData { .. } => true,
            Self::HttpStatus { status, .. } => (400..500).contains(status) && *status != 401,
            _ => false,
        }
    }

    /// Machine-checkable reason code reported in a capability.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::ProviderUnavailable { .. } | Self::InvalidConfig(_) => {
                ReasonCode::ProviderUnavailable
            }
            Self::RateLimited { .. } => ReasonCode::RateLimited,
            Self::ParseError { .. } => ReasonCode::ParseError,
            Self::SymbolNotFound { .. } | Self::NoData { .. } => ReasonCode::NotFound,
            Self::HttpStatus { status, .. } if *status == 404 => ReasonCode::NotFound,
            Self::HttpStatus { .. }
            | Self::Timeout { .. }
            | Self::Network { .. }
            | Self::BatchTimeout { .. } => ReasonCode::NetworkError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_retry_with_backoff() {
        let error = MarketDataError::HttpStatus {
            provider: "FRED".to_string(),
            status: 502,
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_client_errors_never_retry() {
        for status in [400, 401, 403, 404] {
            let error = MarketDataError::HttpStatus {
                provider: "FRED".to_string(),
                status,
            };
            assert_eq!(error.retry_class(), RetryClass::Never, "status {status}");
        }
    }

    #[test]
    fn test_timeout_and_network_retry_with_backoff() {
        let timeout = MarketDataError::Timeout {
            provider: "STOOQ".to_string(),
        };
        let network = MarketDataError::Network {
            provider: "STOOQ".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(timeout.retry_class(), RetryClass::WithBackoff);
        assert_eq!(network.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_rate_limited_cools_down() {
        let error = MarketDataError::RateLimited {
            provider: "ALPHA_VANTAGE".to_string(),
            message: "API call frequency".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Cooldown);
        assert_eq!(error.reason_code(), ReasonCode::RateLimited);
        assert!(!error.tries_next_symbol());
    }

    #[test]
    fn test_unavailable_never_retries() {
        let error = MarketDataError::ProviderUnavailable {
            provider: "FRED".to_string(),
            message: "FRED_API_KEY is not set".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert_eq!(error.reason_code(), ReasonCode::ProviderUnavailable);
        assert!(!error.tries_next_symbol());
    }

    #[test]
    fn test_spelling_failures_try_next_symbol() {
        let not_found = MarketDataError::SymbolNotFound {
            provider: "STOOQ".to_string(),
            symbol: "^DXY".to_string(),
        };
        let parse = MarketDataError::ParseError {
            provider: "STOOQ".to_string(),
            message: "close is N/D".to_string(),
        };
        let unauthorized = MarketDataError::HttpStatus {
            provider: "FINNHUB".to_string(),
            status: 401,
        };
        assert!(not_found.tries_next_symbol());
        assert!(parse.tries_next_symbol());
        assert!(!unauthorized.tries_next_symbol());
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::SymbolNotFound {
            provider: "STOOQ".to_string(),
            symbol: "XYZ".to_string(),
        };
        assert_eq!(format!("{}", error), "Symbol not found: STOOQ - XYZ");

        let error = MarketDataError::HttpStatus {
            provider: "FRED".to_string(),
            status: 500,
        };
        assert_eq!(format!("{}", error), "HTTP 500: FRED");
    }
}
