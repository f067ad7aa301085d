//! Provider trait definitions.
//!
//! Two seams:
//! - [`QuoteSource`] - one upstream API, fetching a single provider symbol
//! - [`SourceAdapter`] - a logical ticker route in, an indicator and its
//!   capability out, never an error

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Capability, Indicator, SourceId, SourceQuote};
use crate::router::ResolvedRoute;

/// An upstream market data API.
///
/// Implement this trait to add support for a new data source. The adapter
/// wraps it with caching, symbol fallback and rate-limit handling.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use pulse_market_data::provider::QuoteSource;
///
/// struct MySource {
///     api_key: Option<String>,
/// }
///
/// #[async_trait]
/// impl QuoteSource for MySource {
///     fn id(&self) -> SourceId {
///         SourceId::Finnhub
///     }
///
///     fn is_configured(&self) -> bool {
///         self.api_key.is_some()
///     }
///
///     async fn fetch_symbol(&self, symbol: &str) -> Result<SourceQuote, MarketDataError> {
///         // ... call the API and parse the response
///     }
/// }
/// ```
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Provider identifier, used in cache keys, logs and capabilities.
    fn id(&self) -> SourceId;

    /// Whether the source has the credentials it needs.
    ///
    /// Unconfigured sources are never called.
    fn is_configured(&self) -> bool {
        true
    }

    /// Fetch the latest and previous value for one provider symbol.
    async fn fetch_symbol(&self, symbol: &str) -> Result<SourceQuote, MarketDataError>;
}

/// What an adapter produced for one logical ticker.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterOutput {
    pub indicator: Indicator,
    pub capability: Capability,
}

impl AdapterOutput {
    /// Degraded output for a route that could not be served.
    pub fn unavailable(route: &ResolvedRoute, capability: Capability) -> Self {
        Self {
            indicator: Indicator::unavailable(
                route.ticker.clone(),
                route.display_name.clone(),
                capability.source_used,
            )
            .with_proxy(route.is_proxy),
            capability,
        }
    }

    /// Mark both halves as served from stale data.
    pub fn into_stale(mut self) -> Self {
        self.indicator.is_stale = true;
        self.capability.is_stale = true;
        self
    }
}

/// Turns a resolved route into an indicator.
///
/// Implementations never fail: every problem is reported through
/// `capability.ok = false` with a reason code.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    fn is_configured(&self) -> bool;

    async fn fetch(&self, route: &ResolvedRoute) -> AdapterOutput;

    /// Best value already held for the route, without any network call.
    ///
    /// Used when `fetch` could not finish in time.
    fn cached(&self, _route: &ResolvedRoute) -> Option<AdapterOutput> {
        None
    }
}
