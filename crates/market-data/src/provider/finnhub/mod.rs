//! Finnhub source.
//!
//! Real-time equity and ETF quotes via the `/quote` endpoint.
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{ParseOutcome, RawQuote, ReasonCode, SourceId, SourceQuote};
use crate::provider::{HttpFetcher, QuoteSource};

pub const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Previous close price
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
    /// Set instead of the fields above on errors
    error: Option<String>,
}

/// Parse a `/quote` body.
///
/// Finnhub answers unknown symbols with 200 and all-zero fields.
pub fn parse_quote(body: &str) -> ParseOutcome {
    let response: QuoteResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return ParseOutcome::failed(
                ReasonCode::ParseError,
                format!("Invalid quote payload: {}", e),
            )
        }
    };

    if let Some(error) = response.error {
        let code = if error.to_lowercase().contains("limit") {
            ReasonCode::RateLimited
        } else {
            ReasonCode::ProviderUnavailable
        };
        return ParseOutcome::failed(code, error);
    }

    match (response.c, response.pc) {
        (Some(c), Some(pc)) if c == 0.0 && pc == 0.0 => {
            ParseOutcome::failed(ReasonCode::NotFound, "Quote fields are all zero")
        }
        (Some(value), Some(prev_value)) => ParseOutcome::Parsed(RawQuote {
            value,
            prev_value,
            as_of: response
                .t
                .filter(|t| *t > 0)
                .and_then(|t| Utc.timestamp_opt(t, 0).single()),
        }),
        _ => ParseOutcome::failed(
            ReasonCode::ParseError,
            "Missing current or previous close",
        ),
    }
}

pub struct FinnhubSource {
    http: Arc<HttpFetcher>,
    api_key: Option<String>,
    base_url: String,
}

impl FinnhubSource {
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
impl QuoteSource for FinnhubSource {
    fn id(&self) -> SourceId {
        SourceId::Finnhub
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
                message: "FINNHUB_API_KEY is not set".to_string(),
            })?;

        let url = format!("{}/quote", self.base_url);

        // API key as header keeps it out of URLs.
        let body = self
            .http
            .get_text(
                self.id(),
                &url,
                &[("symbol", symbol)],
                &[("X-Finnhub-Token", api_key)],
            )
            .await?;

        debug!("Finnhub quote for {}: {}", symbol, body);
        parse_quote(&body).into_quote(self.id(), symbol, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_quote() {
        let body = r#"{"c":502.1,"d":2.1,"dp":0.42,"h":503,"l":498,"o":499,"pc":500,"t":1714593600}"#;
        let ParseOutcome::Parsed(raw) = parse_quote(body) else {
            panic!("expected parsed outcome");
        };
        assert_eq!(raw.value, 502.1);
        assert_eq!(raw.prev_value, 500.0);
        assert_eq!(raw.as_of, Utc.timestamp_opt(1714593600, 0).single());
    }

    #[test]
    fn test_all_zero_quote_is_not_found() {
        let body = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        assert!(matches!(
            parse_quote(body),
            ParseOutcome::Failed {
                code: ReasonCode::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_error_bodies() {
        let limited = r#"{"error":"API limit reached. Please try again later."}"#;
        assert!(matches!(
            parse_quote(limited),
            ParseOutcome::Failed {
                code: ReasonCode::RateLimited,
                ..
            }
        ));

        let denied = r#"{"error":"You don't have access to this resource."}"#;
        assert!(matches!(
            parse_quote(denied),
            ParseOutcome::Failed {
                code: ReasonCode::ProviderUnavailable,
                ..
            }
        ));

        assert!(matches!(
            parse_quote(r#"{"c": 10.0}"#),
            ParseOutcome::Failed {
                code: ReasonCode::ParseError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", "IWM"))
            .and(header("X-Finnhub-Token", "test_key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"c":201.5,"pc":200.0,"t":1714593600}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = Arc::new(HttpFetcher::new(Duration::from_secs(5), RetryPolicy::none()));
        let source =
            FinnhubSource::new(http, Some("test_key".to_string())).with_base_url(server.uri());

        let quote = source.fetch_symbol("IWM").await.unwrap();
        assert_eq!(quote.source, SourceId::Finnhub);
        assert_eq!(quote.value, 201.5);
    }

    #[test]
    fn test_missing_key_is_unconfigured() {
        let source = FinnhubSource::new(Arc::new(HttpFetcher::default()), None);
        assert!(!source.is_configured());
    }
}
