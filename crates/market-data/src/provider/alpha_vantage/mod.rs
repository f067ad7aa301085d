//! Alpha Vantage source.
//!
//! Latest equity and ETF quotes via the `GLOBAL_QUOTE` function. Quotes
//! carry only a trading day, so they are treated as end-of-day values.
//!
//! Note: Alpha Vantage free tier is limited to 25 API calls per day and
//! reports throttling inside a 200 response ("Note" / "Information").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{ParseOutcome, RawQuote, ReasonCode, SourceId, SourceQuote};
use crate::provider::session::end_of_day_timestamp;
use crate::provider::{HttpFetcher, QuoteSource};

pub const BASE_URL: &str = "https://www.alphavantage.co";

/// GLOBAL_QUOTE response
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

const PRICE: &str = "05. price";
const PREVIOUS_CLOSE: &str = "08. previous close";
const LATEST_TRADING_DAY: &str = "07. latest trading day";

fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("api call frequency")
        || lower.contains("rate limit")
        || lower.contains("requests per day")
}

/// Check the throttling and error markers Alpha Vantage embeds in 200s.
fn check_api_error(response: &GlobalQuoteResponse) -> Option<ParseOutcome> {
    if let Some(ref msg) = response.error_message {
        return Some(ParseOutcome::failed(ReasonCode::NotFound, msg.clone()));
    }

    // "Note" is only ever used for throttling
    if let Some(ref msg) = response.note {
        return Some(ParseOutcome::failed(ReasonCode::RateLimited, msg.clone()));
    }

    if let Some(ref msg) = response.information {
        if is_rate_limit_message(msg) {
            return Some(ParseOutcome::failed(ReasonCode::RateLimited, msg.clone()));
        }
        warn!("Alpha Vantage info: {}", msg);
        return Some(ParseOutcome::failed(
            ReasonCode::ProviderUnavailable,
            msg.clone(),
        ));
    }

    None
}

/// Parse a GLOBAL_QUOTE body.
pub fn parse_global_quote(body: &str) -> ParseOutcome {
    let response: GlobalQuoteResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return ParseOutcome::failed(
                ReasonCode::ParseError,
                format!("Invalid GLOBAL_QUOTE payload: {}", e),
            )
        }
    };

    if let Some(failure) = check_api_error(&response) {
        return failure;
    }

    let quote = match response.global_quote {
        Some(q) if !q.is_empty() => q,
        _ => return ParseOutcome::failed(ReasonCode::NotFound, "Empty Global Quote"),
    };

    let number = |key: &str| quote.get(key).and_then(|v| v.trim().parse::<f64>().ok());
    let (Some(value), Some(prev_value)) = (number(PRICE), number(PREVIOUS_CLOSE)) else {
        return ParseOutcome::failed(
            ReasonCode::ParseError,
            format!("Missing or invalid '{}' / '{}'", PRICE, PREVIOUS_CLOSE),
        );
    };

    let as_of = quote
        .get(LATEST_TRADING_DAY)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(end_of_day_timestamp);

    ParseOutcome::Parsed(RawQuote {
        value,
        prev_value,
        as_of,
    })
}

pub struct AlphaVantageSource {
    http: Arc<HttpFetcher>,
    api_key: Option<String>,
    base_url: String,
}

impl AlphaVantageSource {
    pub fn new(http: Arc<HttpFetcher>, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageSource {
    fn id(&self) -> SourceId {
        SourceId::AlphaVantage
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_symbol(&self, symbol: &str) -> Result<SourceQuote, MarketDataError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MarketDataError::ProviderUnavailable {
                provider: self.id().to_string(),
                message: "ALPHA_VANTAGE_API_KEY is not set".to_string(),
            })?;

        let url = format!("{}/query", self.base_url);
        let body = self
            .http
            .get_text(
                self.id(),
                &url,
                &[
                    ("function", "GLOBAL_QUOTE"),
                    ("symbol", symbol),
                    ("apikey", api_key),
                ],
                &[],
            )
            .await?;

        debug!("Alpha Vantage GLOBAL_QUOTE for {}: {} bytes", symbol, body.len());
        parse_global_quote(&body).into_quote(self.id(), symbol, true)
    }
}
