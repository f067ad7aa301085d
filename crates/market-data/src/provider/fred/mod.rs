//! FRED (Federal Reserve Economic Data) source.
//!
//! Treasury yields, credit spreads and other macro series via the
//! `series/observations` endpoint. Observations are end-of-day; missing
//! days are reported as `"."` and skipped.
//!
//! API documentation: https://fred.stlouisfed.org/docs/api/fred/

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{ParseOutcome, RawQuote, ReasonCode, SourceId, SourceQuote};
use crate::provider::session::end_of_day_timestamp;
use crate::provider::{HttpFetcher, QuoteSource};

pub const BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Enough rows to step over a few missing (".") observations.
const OBSERVATION_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
    error_code: Option<i64>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Parse a `series/observations` body requested with `sort_order=desc`.
pub fn parse_observations(body: &str) -> ParseOutcome {
    let response: ObservationsResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return ParseOutcome::failed(
                ReasonCode::ParseError,
                format!("Invalid observations payload: {}", e),
            )
        }
    };

    if let Some(message) = response.error_message {
        let code = if response.error_code == Some(429) || message.contains("Too Many Requests") {
            ReasonCode::RateLimited
        } else {
            ReasonCode::NotFound
        };
        return ParseOutcome::failed(code, message);
    }

    let mut numeric = response.observations.iter().filter_map(|obs| {
        obs.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| (obs, v))
    });

    let (Some((latest, value)), Some((_, prev_value))) = (numeric.next(), numeric.next()) else {
        return ParseOutcome::failed(
            ReasonCode::NotFound,
            "Fewer than two numeric observations",
        );
    };

    let as_of = NaiveDate::parse_from_str(&latest.date, "%Y-%m-%d")
        .ok()
        .and_then(end_of_day_timestamp);

    ParseOutcome::Parsed(RawQuote {
        value,
        prev_value,
        as_of,
    })
}

pub struct FredSource {
    http: Arc<HttpFetcher>,
    api_key: Option<String>,
    base_url: String,
}

impl FredSource {
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
impl QuoteSource for FredSource {
    fn id(&self) -> SourceId {
        SourceId::Fred
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
                message: "FRED_API_KEY is not set".to_string(),
            })?;

        let url = format!("{}/series/observations", self.base_url);
        let body = self
            .http
            .get_text(
                self.id(),
                &url,
                &[
                    ("series_id", symbol),
                    ("api_key", api_key),
                    ("file_type", "json"),
                    ("sort_order", "desc"),
                    ("limit", OBSERVATION_LIMIT),
                ],
                &[],
            )
            .await?;

        debug!("FRED observations for {}: {} bytes", symbol, body.len());
        parse_observations(&body).into_quote(self.id(), symbol, true)
    }
}
