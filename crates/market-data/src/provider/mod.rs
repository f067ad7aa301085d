//! Source adapters and their upstream APIs.
//!
//! This module contains:
//! - The [`QuoteSource`] trait each upstream API implements
//! - The [`SourceAdapter`] contract and its [`ProviderAdapter`] implementation
//! - Shared plumbing: [`HttpFetcher`], [`Cooldown`], session classification
//! - Concrete sources (FRED, Stooq, Finnhub, Alpha Vantage)
//!
//! Sources only fetch and parse. Caching, symbol fallback and rate-limit
//! handling live in the adapter, so every source gets them for free.

mod adapter;
mod cooldown;
mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod fred;
pub mod session;
pub mod stooq;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::MarketDataConfig;
use crate::models::{SourceId, SourceQuote};

pub use adapter::ProviderAdapter;
pub use cooldown::{Cooldown, CooldownStatus, DEFAULT_COOLDOWN};
pub use http::{HttpFetcher, RetryPolicy};
pub use traits::{AdapterOutput, QuoteSource, SourceAdapter};

pub use alpha_vantage::AlphaVantageSource;
pub use finnhub::FinnhubSource;
pub use fred::FredSource;
pub use stooq::StooqSource;

/// Adapters keyed by the provider they serve.
pub type AdapterMap = BTreeMap<SourceId, Arc<dyn SourceAdapter>>;

/// Build one adapter per supported provider from configuration.
///
/// All adapters share one HTTP client, the quote cache and the cool-down
/// tracker.
pub fn build_adapters(
    config: &MarketDataConfig,
    quote_cache: Arc<CacheStore<SourceQuote>>,
    cooldown: Arc<Cooldown>,
) -> AdapterMap {
    let http = Arc::new(HttpFetcher::new(config.http_timeout, config.retry.clone()));

    let sources: Vec<Arc<dyn QuoteSource>> = vec![
        Arc::new(
            FredSource::new(http.clone(), config.fred_api_key.clone())
                .with_base_url(config.fred_base_url.clone()),
        ),
        Arc::new(StooqSource::new(http.clone()).with_base_url(config.stooq_base_url.clone())),
        Arc::new(
            FinnhubSource::new(http.clone(), config.finnhub_api_key.clone())
                .with_base_url(config.finnhub_base_url.clone()),
        ),
        Arc::new(
            AlphaVantageSource::new(http, config.alpha_vantage_api_key.clone())
                .with_base_url(config.alpha_vantage_base_url.clone()),
        ),
    ];

    sources
        .into_iter()
        .map(|source| {
            let id = source.id();
            let adapter: Arc<dyn SourceAdapter> = Arc::new(ProviderAdapter::new(
                source,
                quote_cache.clone(),
                cooldown.clone(),
                config.quote_ttl,
            ));
            (id, adapter)
        })
        .collect()
}
