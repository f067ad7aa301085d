use std::path::PathBuf;
use std::time::Duration;

use crate::provider::{RetryPolicy, DEFAULT_COOLDOWN};
use crate::provider::{alpha_vantage, finnhub, fred, stooq};

/// Runtime configuration for the market data pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketDataConfig {
    pub fred_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub retry: RetryPolicy,

    /// TTL of individual provider quotes in the quote cache.
    pub quote_ttl: Duration,
    /// Upper bound for a whole refresh cycle.
    pub batch_timeout: Duration,
    /// Upper bound for one ticker, symbol fallback and retries included.
    pub ticker_timeout: Duration,
    /// How long a rate-limited provider is left alone.
    pub rate_limit_cooldown: Duration,

    /// JSON routing table replacing the built-in one.
    pub routing_table_path: Option<PathBuf>,

    pub fred_base_url: String,
    pub stooq_base_url: String,
    pub finnhub_base_url: String,
    pub alpha_vantage_base_url: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            fred_api_key: None,
            finnhub_api_key: None,
            alpha_vantage_api_key: None,
            http_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            quote_ttl: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(45),
            ticker_timeout: Duration::from_secs(35),
            rate_limit_cooldown: DEFAULT_COOLDOWN,
            routing_table_path: None,
            fred_base_url: fred::BASE_URL.to_string(),
            stooq_base_url: stooq::BASE_URL.to_string(),
            finnhub_base_url: finnhub::BASE_URL.to_string(),
            alpha_vantage_base_url: alpha_vantage::BASE_URL.to_string(),
        }
    }
}

impl MarketDataConfig {
    /// Read configuration from process environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Longest a single provider symbol can take with every retry used.
    pub fn symbol_budget(&self) -> Duration {
        self.retry.budget(self.http_timeout)
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str| text(name).and_then(|v| v.parse::<u64>().ok());

        let max_attempts = number("PULSE_HTTP_MAX_ATTEMPTS")
            .map(|n| n.clamp(1, 10) as u32)
            .unwrap_or(defaults.retry.max_attempts);

        Self {
            fred_api_key: text("FRED_API_KEY"),
            finnhub_api_key: text("FINNHUB_API_KEY"),
            alpha_vantage_api_key: text("ALPHA_VANTAGE_API_KEY"),
            http_timeout: number("PULSE_HTTP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
            retry: RetryPolicy {
                max_attempts,
                ..defaults.retry
            },
            quote_ttl: number("PULSE_QUOTE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.quote_ttl),
            batch_timeout: number("PULSE_BATCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.batch_timeout),
            ticker_timeout: number("PULSE_TICKER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ticker_timeout),
            rate_limit_cooldown: number("PULSE_RATE_LIMIT_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_cooldown),
            routing_table_path: text("PULSE_ROUTING_TABLE").map(PathBuf::from),
            fred_base_url: text("PULSE_FRED_BASE_URL").unwrap_or(defaults.fred_base_url),
            stooq_base_url: text("PULSE_STOOQ_BASE_URL").unwrap_or(defaults.stooq_base_url),
            finnhub_base_url: text("PULSE_FINNHUB_BASE_URL").unwrap_or(defaults.finnhub_base_url),
            alpha_vantage_base_url: text("PULSE_ALPHA_VANTAGE_BASE_URL")
                .unwrap_or(defaults.alpha_vantage_base_url),
        }
    }
}
