//! Refresh-cycle aggregation.
//!
//! [`Aggregator::fetch_all`] is the single entry point downstream code uses:
//! it fans out over every base route, runs the derived engine, collects
//! warnings and caches the resulting [`IndicatorSnapshot`].
//!
//! ```text
//!   fetch_all(settings)
//!        |
//!        v
//!   snapshot cache (single-flight, keyed by settings)
//!        | miss
//!        v
//!   base routes --join_all--> adapters --> (indicator, capability) per ticker
//!        |
//!        v
//!   derived engine --> warnings --> snapshot
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{CacheDiagnostics, CacheStore};
use crate::config::MarketDataConfig;
use crate::derived::DerivedEngine;
use crate::errors::MarketDataError;
use crate::models::{
    CacheState, Capability, FetchSettings, Indicator, IndicatorSnapshot, ReasonCode,
    SnapshotTimestamps, SourceId, SourceQuote, Ticker, Warning, WarningCode,
};
use crate::provider::session::now_eastern;
use crate::provider::{build_adapters, AdapterMap, AdapterOutput, Cooldown, CooldownStatus};
use crate::router::{ResolvedRoute, RoutingTable, TickerRouter};

/// Time limits for one refresh cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Upper bound for the whole fan-out.
    pub batch_timeout: Duration,
    /// Upper bound for a single ticker.
    pub ticker_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let defaults = MarketDataConfig::default();
        Self::from(&defaults)
    }
}

/// Headroom between the slowest ticker and the end of the batch.
const BATCH_MARGIN: Duration = Duration::from_secs(5);

impl From<&MarketDataConfig> for AggregatorConfig {
    /// Timeouts are raised when needed so that one provider symbol can use
    /// all of its retries, and every ticker can finish before the batch.
    fn from(config: &MarketDataConfig) -> Self {
        let budget = config.symbol_budget();
        let ticker_timeout = if config.ticker_timeout < budget {
            warn!(
                "Ticker timeout {:?} is shorter than the retry budget {:?}, using the budget",
                config.ticker_timeout, budget
            );
            budget
        } else {
            config.ticker_timeout
        };

        let floor = ticker_timeout.saturating_add(BATCH_MARGIN);
        let batch_timeout = if config.batch_timeout < floor {
            warn!(
                "Batch timeout {:?} leaves no room after the ticker timeout, using {:?}",
                config.batch_timeout, floor
            );
            floor
        } else {
            config.batch_timeout
        };

        Self {
            batch_timeout,
            ticker_timeout,
        }
    }
}

/// Operational view over every cache the aggregator touches.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorDiagnostics {
    pub snapshots: CacheDiagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotes: Option<CacheDiagnostics>,
    pub cooldowns: Vec<CooldownStatus>,
}

/// Everything a snapshot build needs. Shared with the build future, which
/// outlives the borrow of `fetch_all`.
struct Pipeline {
    router: Arc<TickerRouter>,
    adapters: AdapterMap,
    engine: DerivedEngine,
    config: AggregatorConfig,
}

pub struct Aggregator {
    pipeline: Arc<Pipeline>,
    snapshot_cache: Arc<CacheStore<IndicatorSnapshot>>,
    quote_cache: Option<Arc<CacheStore<SourceQuote>>>,
    cooldown: Option<Arc<Cooldown>>,
}

impl Aggregator {
    pub fn new(
        router: Arc<TickerRouter>,
        adapters: AdapterMap,
        snapshot_cache: Arc<CacheStore<IndicatorSnapshot>>,
        config: AggregatorConfig,
    ) -> Self {
        let engine = DerivedEngine::new(router.derived_specs().to_vec());
        Self {
            pipeline: Arc::new(Pipeline {
                router,
                adapters,
                engine,
                config,
            }),
            snapshot_cache,
            quote_cache: None,
            cooldown: None,
        }
    }

    /// Include a quote cache in [`cache_diagnostics`](Self::cache_diagnostics).
    pub fn with_quote_cache(mut self, quote_cache: Arc<CacheStore<SourceQuote>>) -> Self {
        self.quote_cache = Some(quote_cache);
        self
    }

    /// Include cool-down state in [`cache_diagnostics`](Self::cache_diagnostics).
    pub fn with_cooldown(mut self, cooldown: Arc<Cooldown>) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Wire up router, caches and adapters from configuration.
    pub fn from_config(config: &MarketDataConfig) -> Result<Self, MarketDataError> {
        let table = match &config.routing_table_path {
            Some(path) => {
                info!("Loading routing table from {}", path.display());
                RoutingTable::from_path(path)?
            }
            None => RoutingTable::default_table(),
        };
        let router = Arc::new(TickerRouter::new(table)?);

        let quote_cache = Arc::new(CacheStore::new("quotes"));
        let cooldown = Arc::new(Cooldown::new(config.rate_limit_cooldown));
        let adapters = build_adapters(config, quote_cache.clone(), cooldown.clone());

        Ok(Self::new(
            router,
            adapters,
            Arc::new(CacheStore::new("snapshots")),
            AggregatorConfig::from(config),
        )
        .with_quote_cache(quote_cache)
        .with_cooldown(cooldown))
    }

    pub fn router(&self) -> &TickerRouter {
        &self.pipeline.router
    }

    /// Fetch every indicator, through the snapshot cache.
    ///
    /// Per-ticker failures never fail the call. An error is returned only
    /// when the batch times out and no earlier snapshot exists.
    pub async fn fetch_all(
        &self,
        settings: &FetchSettings,
    ) -> Result<IndicatorSnapshot, MarketDataError> {
        let pipeline = self.pipeline.clone();
        let cached = self
            .snapshot_cache
            .single_flight(
                &settings.cache_key(),
                move || async move { pipeline.build_with_timeout().await },
                settings.ttl(),
            )
            .await?;

        let state = cached.state;
        let age_secs = cached.age_secs();
        let mut snapshot = cached.data;

        snapshot.cache_state = state;
        snapshot.cache_age_seconds = age_secs;
        snapshot.timestamps.pulled_at_et = now_eastern();

        if state == CacheState::Stale {
            warn!("Refresh failed, serving snapshot from {}s ago", age_secs);
            for indicator in snapshot.indicators.values_mut() {
                indicator.is_stale = true;
            }
            for capability in snapshot.capabilities.values_mut() {
                capability.is_stale = true;
            }
            snapshot.warnings.push(Warning::new(
                WarningCode::StaleData,
                format!("Refresh failed; showing data from {}s ago", age_secs),
            ));
        }

        Ok(snapshot)
    }

    /// Diagnostics for the snapshot cache, plus the quote cache and
    /// cool-downs when they are attached.
    pub fn cache_diagnostics(&self) -> AggregatorDiagnostics {
        AggregatorDiagnostics {
            snapshots: self.snapshot_cache.diagnostics(),
            quotes: self.quote_cache.as_ref().map(|cache| cache.diagnostics()),
            cooldowns: self
                .cooldown
                .as_ref()
                .map(|cooldown| cooldown.snapshot())
                .unwrap_or_default(),
        }
    }
}

impl Pipeline {
    async fn build_with_timeout(&self) -> Result<IndicatorSnapshot, MarketDataError> {
        let after = self.config.batch_timeout;
        tokio::time::timeout(after, self.build())
            .await
            .map_err(|_| {
                error!("Refresh cycle did not finish within {:?}", after);
                MarketDataError::BatchTimeout { after }
            })
    }

    async fn build(&self) -> IndicatorSnapshot {
        let started = Instant::now();
        let groups = self.router.routes_by_provider();

        let mut routes: Vec<&ResolvedRoute> = Vec::new();
        let mut fetches = Vec::new();
        for (provider, group) in &groups {
            for route in group {
                routes.push(*route);
                fetches.push(self.fetch_one(*provider, route));
            }
        }
        let outputs = join_all(fetches).await;
        let results: Vec<(&ResolvedRoute, AdapterOutput)> =
            routes.into_iter().zip(outputs).collect();

        let mut warnings = self.provider_warnings(&results);
        let mut indicators: BTreeMap<Ticker, Indicator> = BTreeMap::new();
        let mut capabilities: BTreeMap<Ticker, Capability> = BTreeMap::new();
        let mut base: HashMap<Ticker, (Indicator, Capability)> = HashMap::new();

        for (route, output) in results {
            if !output.capability.ok && !route.optional {
                warnings.push(Warning::for_ticker(
                    WarningCode::TickerUnavailable,
                    route.ticker.clone(),
                    format!(
                        "{} unavailable: {}",
                        route.display_name,
                        output.capability.reason.as_deref().unwrap_or("unknown reason")
                    ),
                ));
            }
            base.insert(
                route.ticker.clone(),
                (output.indicator.clone(), output.capability.clone()),
            );
            indicators.insert(route.ticker.clone(), output.indicator);
            capabilities.insert(route.ticker.clone(), output.capability);
        }

        let derived = self.engine.compute(&base);
        indicators.extend(derived.indicators);
        capabilities.extend(derived.capabilities);
        warnings.extend(derived.warnings);

        let stale: Vec<&str> = indicators
            .values()
            .filter(|i| i.is_stale)
            .map(|i| i.ticker.as_str())
            .collect();
        if !stale.is_empty() {
            warnings.push(Warning::new(
                WarningCode::StaleData,
                format!("Serving last known values for: {}", stale.join(", ")),
            ));
        }

        let now = now_eastern();
        let data_as_of_et = indicators
            .values()
            .filter_map(|i| i.as_of_et)
            .max()
            .unwrap_or(now);

        let snapshot = IndicatorSnapshot {
            indicators,
            capabilities,
            warnings,
            cache_state: CacheState::Live,
            cache_age_seconds: 0,
            timestamps: SnapshotTimestamps {
                data_as_of_et,
                pulled_at_et: now,
                built_at_et: now,
            },
        };

        info!(
            "Built snapshot: {}/{} indicators available, {} warnings, in {:?}",
            snapshot.available_tickers().count(),
            snapshot.indicators.len(),
            snapshot.warnings.len(),
            started.elapsed()
        );
        snapshot
    }

    /// Fetch one ticker behind a panic and timeout boundary.
    async fn fetch_one(&self, provider: SourceId, route: &ResolvedRoute) -> AdapterOutput {
        let Some(adapter) = self.adapters.get(&provider) else {
            return AdapterOutput::unavailable(
                route,
                Capability::failed(
                    provider,
                    ReasonCode::ProviderUnavailable,
                    format!("No adapter registered for {}", provider),
                    Vec::new(),
                ),
            );
        };

        let guarded = AssertUnwindSafe(adapter.fetch(route)).catch_unwind();
        let outcome = tokio::time::timeout(self.config.ticker_timeout, guarded).await;
        let (code, reason) = match outcome {
            Ok(Ok(output)) => return output,
            Ok(Err(_)) => {
                error!("{}: adapter panicked while fetching {}", provider, route.ticker);
                (ReasonCode::NetworkError, "Internal error while fetching".to_string())
            }
            Err(_) => {
                warn!(
                    "{}: {} timed out after {:?}",
                    provider, route.ticker, self.config.ticker_timeout
                );
                (
                    ReasonCode::NetworkError,
                    format!("Timed out after {:?}", self.config.ticker_timeout),
                )
            }
        };

        if let Some(output) = adapter.cached(route) {
            info!("{}: serving last known value for {}", provider, route.ticker);
            return output.into_stale();
        }

        AdapterOutput::unavailable(
            route,
            Capability::failed(provider, code, reason, route.symbols.clone()),
        )
    }

    /// One warning per unconfigured and per rate-limited provider.
    fn provider_warnings(&self, results: &[(&ResolvedRoute, AdapterOutput)]) -> Vec<Warning> {
        let mut warnings = Vec::new();

        for provider in self.router.providers() {
            let configured = self
                .adapters
                .get(&provider)
                .is_some_and(|adapter| adapter.is_configured());
            if !configured {
                warnings.push(Warning::new(
                    WarningCode::ProviderUnconfigured,
                    format!("{} is not configured; its tickers are unavailable", provider),
                ));
            }
        }

        let rate_limited: BTreeSet<SourceId> = results
            .iter()
            .filter(|(_, output)| output.capability.reason_code == Some(ReasonCode::RateLimited))
            .map(|(route, _)| route.provider)
            .collect();
        for provider in rate_limited {
            warnings.push(Warning::new(
                WarningCode::RateLimited,
                format!("{} is rate limiting requests", provider),
            ));
        }

        warnings
    }
}
