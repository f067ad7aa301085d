//! Cached, fallback-aware adapter around a [`QuoteSource`].
//!
//! For one resolved route the adapter:
//! 1. refuses to call a source that has no credentials,
//! 2. serves cached values while the provider is cooling down,
//! 3. tries candidate symbols in order through the quote cache,
//!    advancing only on spelling-type failures.
//!
//! Failures never escape as errors; they become `capability.ok = false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Cached};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{
    Capability, Indicator, ProviderSymbol, ReasonCode, Session, SourceId, SourceQuote,
};
use crate::router::ResolvedRoute;

use super::cooldown::Cooldown;
use super::session::{classify_session, to_eastern};
use super::traits::{AdapterOutput, QuoteSource, SourceAdapter};

pub struct ProviderAdapter {
    source: Arc<dyn QuoteSource>,
    cache: Arc<CacheStore<SourceQuote>>,
    cooldown: Arc<Cooldown>,
    ttl: Duration,
}

impl ProviderAdapter {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        cache: Arc<CacheStore<SourceQuote>>,
        cooldown: Arc<Cooldown>,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            cooldown,
            ttl,
        }
    }

    /// Quote cache key, e.g. `FRED:DGS10`.
    pub fn cache_key(source: SourceId, symbol: &str) -> String {
        format!("{}:{}", source, symbol)
    }

    fn served(
        &self,
        route: &ResolvedRoute,
        symbol: &ProviderSymbol,
        quote: Cached<SourceQuote>,
        tried: Vec<ProviderSymbol>,
    ) -> AdapterOutput {
        let stale = quote.is_stale();
        let quote = quote.data;

        let session = if quote.end_of_day {
            Session::Close
        } else {
            quote.as_of.map(classify_session).unwrap_or(Session::Close)
        };

        let indicator = Indicator::from_values(
            route.ticker.clone(),
            route.display_name.clone(),
            quote.value,
            quote.prev_value,
            session,
            quote.as_of.map(to_eastern),
            quote.source,
        )
        .with_proxy(route.is_proxy)
        .with_stale(stale);

        AdapterOutput {
            indicator,
            capability: Capability::available(quote.source, Some(symbol.clone()), tried)
                .with_stale(stale),
        }
    }

    fn failed(
        &self,
        route: &ResolvedRoute,
        code: ReasonCode,
        reason: impl Into<String>,
        tried: Vec<ProviderSymbol>,
    ) -> AdapterOutput {
        AdapterOutput::unavailable(
            route,
            Capability::failed(self.source.id(), code, reason, tried),
        )
    }

    /// Best cached value for any candidate, without touching the network.
    fn serve_from_cache(&self, route: &ResolvedRoute) -> Option<AdapterOutput> {
        let provider = self.source.id();
        route.symbols.iter().find_map(|symbol| {
            self.cache
                .peek(&Self::cache_key(provider, symbol))
                .map(|cached| self.served(route, symbol, cached, vec![symbol.clone()]))
        })
    }

    async fn fetch_through_cache(
        &self,
        symbol: &str,
    ) -> Result<Cached<SourceQuote>, MarketDataError> {
        let provider = self.source.id();
        let source = self.source.clone();
        let cooldown = self.cooldown.clone();
        let owned_symbol = symbol.to_string();

        self.cache
            .single_flight(
                &Self::cache_key(provider, symbol),
                move || async move {
                    let result = source.fetch_symbol(&owned_symbol).await;
                    if let Err(ref error) = result {
                        if error.retry_class() == RetryClass::Cooldown {
                            cooldown.trip(provider);
                        }
                    }
                    result
                },
                self.ttl,
            )
            .await
    }
}

#[async_trait]
impl SourceAdapter for ProviderAdapter {
    fn source(&self) -> SourceId {
        self.source.id()
    }

    fn is_configured(&self) -> bool {
        self.source.is_configured()
    }

    async fn fetch(&self, route: &ResolvedRoute) -> AdapterOutput {
        let provider = self.source.id();

        if !self.source.is_configured() {
            debug!("{} is not configured, skipping {}", provider, route.ticker);
            return self.failed(
                route,
                ReasonCode::ProviderUnavailable,
                format!("{} has no API key configured", provider),
                Vec::new(),
            );
        }

        if let Some(remaining) = self.cooldown.remaining(provider) {
            if let Some(output) = self.serve_from_cache(route) {
                debug!(
                    "{} cooling down, serving cached value for {}",
                    provider, route.ticker
                );
                return output;
            }
            return self.failed(
                route,
                ReasonCode::RateLimited,
                format!(
                    "{} is rate limited, retrying in {}s",
                    provider,
                    remaining.as_secs()
                ),
                Vec::new(),
            );
        }

        let mut tried: Vec<ProviderSymbol> = Vec::with_capacity(route.symbols.len());
        let mut last_error: Option<MarketDataError> = None;

        for symbol in &route.symbols {
            tried.push(symbol.clone());

            match self.fetch_through_cache(symbol).await {
                Ok(quote) => {
                    if tried.len() > 1 {
                        info!(
                            "{}: resolved {} via fallback symbol '{}'",
                            provider, route.ticker, symbol
                        );
                    }
                    return self.served(route, symbol, quote, tried);
                }
                Err(error) => {
                    let next = error.tries_next_symbol();
                    if next {
                        debug!(
                            "{}: '{}' failed for {}: {}",
                            provider, symbol, route.ticker, error
                        );
                    } else {
                        warn!(
                            "{}: '{}' failed for {}: {}",
                            provider, symbol, route.ticker, error
                        );
                    }
                    last_error = Some(error);
                    if !next {
                        break;
                    }
                }
            }
        }

        let (code, reason) = match last_error {
            Some(error) => (error.reason_code(), error.to_string()),
            None => (ReasonCode::NoRoute, format!("No symbols for {}", route.ticker)),
        };
        self.failed(route, code, reason, tried)
    }

    fn cached(&self, route: &ResolvedRoute) -> Option<AdapterOutput> {
        self.serve_from_cache(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use futures::future::join_all;

    /// Canned per-symbol responses, counting calls.
    struct MockSource {
        id: SourceId,
        configured: bool,
        responses: Mutex<HashMap<String, Result<SourceQuote, MarketDataError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl MockSource {
        fn new(id: SourceId) -> Self {
            Self {
                id,
                configured: true,
                responses: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn respond(&self, symbol: &str, response: Result<SourceQuote, MarketDataError>) {
            self.responses
                .lock()
                .unwrap()
                .insert(symbol.to_string(), response);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        fn id(&self) -> SourceId {
            self.id
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn fetch_symbol(&self, symbol: &str) -> Result<SourceQuote, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| {
                    Err(MarketDataError::SymbolNotFound {
                        provider: self.id.to_string(),
                        symbol: symbol.to_string(),
                    })
                })
        }
    }

    fn quote(source: SourceId, symbol: &str, value: f64, prev: f64) -> SourceQuote {
        SourceQuote {
            source,
            symbol: symbol.to_string(),
            value,
            prev_value: prev,
            // Wednesday 2024-05-01 11:00 New York
            as_of: Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).single(),
            end_of_day: false,
        }
    }

    fn route(ticker: &str, provider: SourceId, symbols: &[&str]) -> ResolvedRoute {
        ResolvedRoute {
            ticker: ticker.to_string(),
            display_name: ticker.to_string(),
            provider,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            is_proxy: false,
            proxy_ticker: None,
            optional: false,
        }
    }

    fn rate_limited(source: SourceId) -> MarketDataError {
        MarketDataError::RateLimited {
            provider: source.to_string(),
            message: "daily hits limit".to_string(),
        }
    }

    fn adapter(
        source: Arc<MockSource>,
    ) -> (ProviderAdapter, Arc<CacheStore<SourceQuote>>, Arc<Cooldown>) {
        let cache = Arc::new(CacheStore::new("quotes"));
        let cooldown = Arc::new(Cooldown::new(Duration::from_secs(60)));
        let adapter = ProviderAdapter::new(
            source,
            cache.clone(),
            cooldown.clone(),
            Duration::from_secs(30),
        );
        (adapter, cache, cooldown)
    }

    #[tokio::test]
    async fn test_first_symbol_success() {
        let source = Arc::new(MockSource::new(SourceId::Stooq));
        source.respond("^spx", Ok(quote(SourceId::Stooq, "^spx", 5050.0, 5000.0)));
        let (adapter, _, _) = adapter(source.clone());

        let output = adapter.fetch(&route("SPX", SourceId::Stooq, &["^spx"])).await;

        assert!(output.capability.ok);
        assert_eq!(output.capability.resolved_symbol.as_deref(), Some("^spx"));
        assert_eq!(output.capability.tried_symbols, vec!["^spx"]);
        assert_eq!(output.indicator.price, Some(5050.0));
        assert_eq!(output.indicator.change, Some(50.0));
        assert_eq!(output.indicator.change_pct, Some(1.0));
        assert_eq!(output.indicator.session, Session::Regular);
        assert_eq!(output.indicator.source, SourceId::Stooq);
        assert!(!output.indicator.is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_routes_share_one_symbol_fetch() {
        let mut mock = MockSource::new(SourceId::Stooq);
        mock.delay = Duration::from_secs(2);
        mock.respond("^spx", Ok(quote(SourceId::Stooq, "^spx", 5050.0, 5000.0)));
        let source = Arc::new(mock);
        let (adapter, _, _) = adapter(source.clone());

        let spx = route("SPX", SourceId::Stooq, &["^spx"]);
        let benchmark = route("BENCHMARK", SourceId::Stooq, &["^spx"]);
        let outputs = join_all(vec![adapter.fetch(&spx), adapter.fetch(&benchmark)]).await;

        assert_eq!(source.calls(), 1);
        assert!(outputs.iter().all(|o| o.capability.ok));
        assert!(outputs.iter().all(|o| o.indicator.price == Some(5050.0)));
        assert_eq!(outputs[1].indicator.ticker, "BENCHMARK");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_spelling() {
        let source = Arc::new(MockSource::new(SourceId::Stooq));
        source.respond("^dxy", Ok(quote(SourceId::Stooq, "^dxy", 105.0, 104.0)));
        let (adapter, _, _) = adapter(source.clone());

        let output = adapter
            .fetch(&route("DXY", SourceId::Stooq, &["dx.f", "^dxy"]))
            .await;

        assert!(output.capability.ok);
        assert_eq!(output.capability.resolved_symbol.as_deref(), Some("^dxy"));
        assert_eq!(output.capability.tried_symbols, vec!["dx.f", "^dxy"]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_report_every_symbol() {
        let source = Arc::new(MockSource::new(SourceId::Fred));
        let (adapter, _, _) = adapter(source.clone());

        let output = adapter
            .fetch(&route("US3M", SourceId::Fred, &["DGS3MO", "DTB3"]))
            .await;

        assert!(!output.capability.ok);
        assert_eq!(output.capability.reason_code, Some(ReasonCode::NotFound));
        assert_eq!(output.capability.tried_symbols, vec!["DGS3MO", "DTB3"]);
        assert!(output.capability.reason.is_some());
        assert_eq!(output.indicator.price, None);
        assert_eq!(output.indicator.session, Session::Na);
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_never_called() {
        let mut mock = MockSource::new(SourceId::Finnhub);
        mock.configured = false;
        let source = Arc::new(mock);
        let (adapter, _, _) = adapter(source.clone());

        let output = adapter.fetch(&route("SPY", SourceId::Finnhub, &["SPY"])).await;

        assert!(!output.capability.ok);
        assert_eq!(
            output.capability.reason_code,
            Some(ReasonCode::ProviderUnavailable)
        );
        assert!(output.capability.tried_symbols.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_error_stops_fallback() {
        let source = Arc::new(MockSource::new(SourceId::Stooq));
        source.respond(
            "dx.f",
            Err(MarketDataError::Network {
                provider: "STOOQ".to_string(),
                message: "connection reset".to_string(),
            }),
        );
        source.respond("^dxy", Ok(quote(SourceId::Stooq, "^dxy", 105.0, 104.0)));
        let (adapter, _, _) = adapter(source.clone());

        let output = adapter
            .fetch(&route("DXY", SourceId::Stooq, &["dx.f", "^dxy"]))
            .await;

        assert!(!output.capability.ok);
        assert_eq!(output.capability.reason_code, Some(ReasonCode::NetworkError));
        assert_eq!(output.capability.tried_symbols, vec!["dx.f"]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_parks_provider() {
        let source = Arc::new(MockSource::new(SourceId::AlphaVantage));
        source.respond("SPY", Err(rate_limited(SourceId::AlphaVantage)));
        source.respond("QQQ", Ok(quote(SourceId::AlphaVantage, "QQQ", 1.0, 1.0)));
        let (adapter, _, cooldown) = adapter(source.clone());

        let first = adapter
            .fetch(&route("SPY", SourceId::AlphaVantage, &["SPY"]))
            .await;
        assert_eq!(first.capability.reason_code, Some(ReasonCode::RateLimited));
        assert!(cooldown.is_cooling_down(SourceId::AlphaVantage));

        let second = adapter
            .fetch(&route("QQQ", SourceId::AlphaVantage, &["QQQ"]))
            .await;
        assert_eq!(second.capability.reason_code, Some(ReasonCode::RateLimited));
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let third = adapter
            .fetch(&route("QQQ", SourceId::AlphaVantage, &["QQQ"]))
            .await;
        assert!(third.capability.ok);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_serves_cached_value() {
        let source = Arc::new(MockSource::new(SourceId::Stooq));
        let (adapter, cache, cooldown) = adapter(source.clone());
        cache.set(
            &ProviderAdapter::cache_key(SourceId::Stooq, "^spx"),
            quote(SourceId::Stooq, "^spx", 5050.0, 5000.0),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        cooldown.trip(SourceId::Stooq);

        let output = adapter.fetch(&route("SPX", SourceId::Stooq, &["^spx"])).await;

        assert!(output.capability.ok);
        assert!(output.capability.is_stale);
        assert!(output.indicator.is_stale);
        assert_eq!(output.indicator.price, Some(5050.0));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_success_serves_stale() {
        let source = Arc::new(MockSource::new(SourceId::Fred));
        source.respond("DGS10", Ok(quote(SourceId::Fred, "DGS10", 4.6, 4.5)));
        let (adapter, _, _) = adapter(source.clone());
        let us10y = route("US10Y", SourceId::Fred, &["DGS10"]);

        assert!(adapter.fetch(&us10y).await.capability.ok);

        source.respond(
            "DGS10",
            Err(MarketDataError::HttpStatus {
                provider: "FRED".to_string(),
                status: 503,
            }),
        );
        tokio::time::sleep(Duration::from_secs(31)).await;

        let output = adapter.fetch(&us10y).await;
        assert!(output.capability.ok);
        assert!(output.indicator.is_stale);
        assert_eq!(output.indicator.price, Some(4.6));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_proxy_flag_and_end_of_day_session() {
        let source = Arc::new(MockSource::new(SourceId::Fred));
        let mut eod = quote(SourceId::Fred, "IWM", 200.0, 198.0);
        eod.end_of_day = true;
        source.respond("iwm.us", Ok(eod));
        let (adapter, _, _) = adapter(source.clone());

        let mut rut = route("RUT", SourceId::Fred, &["iwm.us"]);
        rut.is_proxy = true;
        rut.proxy_ticker = Some("IWM".to_string());

        let output = adapter.fetch(&rut).await;
        assert!(output.indicator.is_proxy);
        assert_eq!(output.indicator.ticker, "RUT");
        assert_eq!(output.indicator.session, Session::Close);
    }
}
