//! Stooq source.
//!
//! Index levels, futures and FX via the keyless CSV quote endpoint:
//!
//! ```text
//! Symbol,Date,Time,Open,High,Low,Close,Prev
//! ^SPX,2024-05-01,22:00:09,5029.03,5096.12,5013.45,5018.39,5035.69
//! ```
//!
//! Unknown symbols come back as a row of `N/D`. Date and time are Warsaw
//! local time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Europe::Warsaw;
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{ParseOutcome, RawQuote, ReasonCode, SourceId, SourceQuote};
use crate::provider::{HttpFetcher, QuoteSource};

pub const BASE_URL: &str = "https://stooq.com";

/// Symbol, date, time, open, high, low, close, previous close.
const FIELDS: &str = "sd2t2ohlcp";

const RATE_LIMIT_MARKER: &str = "Exceeded the daily hits limit";
const NO_DATA: &str = "N/D";

const COL_DATE: usize = 1;
const COL_TIME: usize = 2;
const COL_CLOSE: usize = 6;
const COL_PREV: usize = 7;

fn field<'a>(record: &'a StringRecord, index: usize) -> Option<&'a str> {
    record.get(index).filter(|v| !v.is_empty() && *v != NO_DATA)
}

fn parse_timestamp(record: &StringRecord) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(field(record, COL_DATE)?, "%Y-%m-%d").ok()?;
    let time = field(record, COL_TIME)
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .unwrap_or(NaiveTime::MIN);
    Warsaw
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Parse a single-row quote CSV.
pub fn parse_quote_csv(body: &str) -> ParseOutcome {
    if body.contains(RATE_LIMIT_MARKER) {
        return ParseOutcome::failed(ReasonCode::RateLimited, RATE_LIMIT_MARKER);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let record = match reader.records().next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => {
            return ParseOutcome::failed(ReasonCode::ParseError, format!("Invalid CSV: {}", e))
        }
        None => return ParseOutcome::failed(ReasonCode::NotFound, "Empty quote response"),
    };

    if record.len() <= COL_PREV {
        return ParseOutcome::failed(
            ReasonCode::ParseError,
            format!("Expected {} columns, got {}", COL_PREV + 1, record.len()),
        );
    }

    let Some(close) = field(&record, COL_CLOSE) else {
        return ParseOutcome::failed(ReasonCode::NotFound, "No data for symbol");
    };
    let Some(prev) = field(&record, COL_PREV) else {
        return ParseOutcome::failed(ReasonCode::ParseError, "Previous close missing");
    };

    match (close.parse::<f64>(), prev.parse::<f64>()) {
        (Ok(value), Ok(prev_value)) if value.is_finite() && prev_value.is_finite() => {
            ParseOutcome::Parsed(RawQuote {
                value,
                prev_value,
                as_of: parse_timestamp(&record),
            })
        }
        _ => ParseOutcome::failed(
            ReasonCode::ParseError,
            format!("Non-numeric close '{}' or previous close '{}'", close, prev),
        ),
    }
}

pub struct StooqSource {
    http: Arc<HttpFetcher>,
    base_url: String,
}

impl StooqSource {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl QuoteSource for StooqSource {
    fn id(&self) -> SourceId {
        SourceId::Stooq
    }

    async fn fetch_symbol(&self, symbol: &str) -> Result<SourceQuote, MarketDataError> {
        let url = format!("{}/q/l/", self.base_url);
        let body = self
            .http
            .get_text(
                self.id(),
                &url,
                &[("s", symbol), ("f", FIELDS), ("h", ""), ("e", "csv")],
                &[],
            )
            .await?;

        debug!("Stooq quote for {}: {:?}", symbol, body.lines().nth(1));
        parse_quote_csv(&body).into_quote(self.id(), symbol, false)
    }
}
