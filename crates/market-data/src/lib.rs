//! Pulse Market Data Crate
//!
//! This crate acquires the market indicators behind the Pulse dashboard:
//! equity indices, volatility, rates, credit spreads and commodities,
//! plus the ratios and spreads computed from them.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Multiple free providers: FRED, Stooq, Finnhub, Alpha Vantage
//! - Declarative ticker routing with symbol fallback and proxies
//! - TTL caching with single-flight and last-known-good fallback
//! - Derived indicators (ratios and spreads)
//! - Partial failure: one bad ticker never fails a refresh
//!
//! # Architecture
//!
//! ```text
//!                          +------------------+
//!                          |   Aggregator     |  fetch_all(settings)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  Snapshot cache  |  (single-flight, LKG)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  TickerRouter    |  ticker -> provider + symbols
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | ProviderAdapter  |  fallback, cool-down, quote cache
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  QuoteSource     |  (FRED, Stooq, Finnhub, ...)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  DerivedEngine   |  ratios and spreads
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Indicator`] - One indicator value handed downstream
//! - [`Capability`] - How an indicator was obtained, or why it was not
//! - [`IndicatorSnapshot`] - Everything one refresh cycle produces
//! - [`FetchSettings`] - Parameters that key the snapshot cache
//! - [`MarketDataConfig`] - Runtime configuration read from the environment

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod derived;
pub mod errors;
pub mod models;
pub mod provider;
pub mod router;

pub use aggregator::{Aggregator, AggregatorConfig, AggregatorDiagnostics};
pub use cache::{CacheDiagnostics, CacheStore, Cached};
pub use config::MarketDataConfig;
pub use derived::{DerivedEngine, DerivedOutput};
pub use errors::{MarketDataError, RetryClass};

pub use models::{
    CacheState, Capability, FetchSettings, Indicator, IndicatorSnapshot, ReasonCode, Session,
    SnapshotTimestamps, SourceId, SourceQuote, Ticker, Warning, WarningCode,
};

pub use provider::{
    AdapterOutput, AlphaVantageSource, Cooldown, FinnhubSource, FredSource, HttpFetcher,
    ProviderAdapter, QuoteSource, RetryPolicy, SourceAdapter, StooqSource,
};

pub use router::{
    DerivedComponent, DerivedOp, DerivedSpec, ResolvedRoute, RoutingTable, TickerRouter,
};
