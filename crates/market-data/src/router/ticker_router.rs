//! Static ticker router.
//!
//! Every base ticker maps to exactly one provider. There is no runtime
//! fallback across providers; spelling fallback within one provider is the
//! adapter's job.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::errors::MarketDataError;
use crate::models::{ProviderSymbol, SourceId, Ticker};

use super::table::{DerivedSpec, RoutingTable, TickerRoute};

/// A base ticker resolved to the provider that will serve it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The logical ticker the result is reported under.
    pub ticker: Ticker,
    pub display_name: String,
    pub provider: SourceId,
    /// Candidate provider symbols, in the order they are tried.
    pub symbols: Vec<ProviderSymbol>,
    pub is_proxy: bool,
    /// The stand-in ticker when `is_proxy` is set.
    pub proxy_ticker: Option<Ticker>,
    pub optional: bool,
}

/// Classification of a logical ticker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Base(ResolvedRoute),
    Derived(&'a DerivedSpec),
}

pub struct TickerRouter {
    base: Vec<ResolvedRoute>,
    derived: Vec<DerivedSpec>,
    index: HashMap<Ticker, usize>,
}

impl TickerRouter {
    /// Build a router, validating the table.
    pub fn new(table: RoutingTable) -> Result<Self, MarketDataError> {
        let mut seen: HashSet<Ticker> = HashSet::new();
        let mut base = Vec::with_capacity(table.tickers.len());
        let mut index = HashMap::new();

        for route in &table.tickers {
            if !seen.insert(route.ticker.clone()) {
                return Err(MarketDataError::InvalidConfig(format!(
                    "duplicate ticker '{}'",
                    route.ticker
                )));
            }
            let resolved = resolve(route)?;
            index.insert(route.ticker.clone(), base.len());
            base.push(resolved);
        }

        for spec in &table.derived {
            for component in [&spec.a, &spec.b] {
                if !seen.contains(&component.ticker) {
                    return Err(MarketDataError::InvalidConfig(format!(
                        "derived ticker '{}' references unknown ticker '{}'",
                        spec.ticker, component.ticker
                    )));
                }
            }
            if !seen.insert(spec.ticker.clone()) {
                return Err(MarketDataError::InvalidConfig(format!(
                    "duplicate ticker '{}'",
                    spec.ticker
                )));
            }
        }

        Ok(Self {
            base,
            derived: table.derived,
            index,
        })
    }

    /// Router over the built-in table.
    pub fn with_default_table() -> Result<Self, MarketDataError> {
        Self::new(RoutingTable::default_table())
    }

    pub fn route(&self, ticker: &str) -> Option<Route<'_>> {
        if let Some(&i) = self.index.get(ticker) {
            return Some(Route::Base(self.base[i].clone()));
        }
        self.derived
            .iter()
            .find(|spec| spec.ticker == ticker)
            .map(Route::Derived)
    }

    /// Resolve a base ticker. Derived and unknown tickers return `None`.
    pub fn resolve(&self, ticker: &str) -> Option<&ResolvedRoute> {
        self.index.get(ticker).map(|&i| &self.base[i])
    }

    pub fn is_derived(&self, ticker: &str) -> bool {
        self.derived.iter().any(|spec| spec.ticker == ticker)
    }

    pub fn base_routes(&self) -> &[ResolvedRoute] {
        &self.base
    }

    pub fn derived_specs(&self) -> &[DerivedSpec] {
        &self.derived
    }

    /// Base routes grouped by provider, keeping table order within a group.
    pub fn routes_by_provider(&self) -> BTreeMap<SourceId, Vec<&ResolvedRoute>> {
        let mut groups: BTreeMap<SourceId, Vec<&ResolvedRoute>> = BTreeMap::new();
        for route in &self.base {
            groups.entry(route.provider).or_default().push(route);
        }
        groups
    }

    /// Providers referenced by at least one base route.
    pub fn providers(&self) -> BTreeSet<SourceId> {
        self.base.iter().map(|r| r.provider).collect()
    }

    pub fn display_name(&self, ticker: &str) -> Option<&str> {
        if let Some(route) = self.resolve(ticker) {
            return Some(&route.display_name);
        }
        self.derived
            .iter()
            .find(|spec| spec.ticker == ticker)
            .map(|spec| spec.display_name.as_str())
    }
}

fn resolve(route: &TickerRoute) -> Result<ResolvedRoute, MarketDataError> {
    let (provider, symbols, proxy_ticker) = match (&route.primary, &route.proxy) {
        (Some(primary), _) => (primary.provider, primary.symbols.clone(), None),
        (None, Some(proxy)) => (
            proxy.provider,
            proxy.symbols.clone(),
            Some(proxy.ticker.clone()),
        ),
        (None, None) => {
            return Err(MarketDataError::InvalidConfig(format!(
                "ticker '{}' has neither a primary nor a proxy route",
                route.ticker
            )))
        }
    };

    if symbols.is_empty() {
        return Err(MarketDataError::InvalidConfig(format!(
            "ticker '{}' has no candidate symbols",
            route.ticker
        )));
    }
    if matches!(provider, SourceId::Derived | SourceId::Unknown) {
        return Err(MarketDataError::InvalidConfig(format!(
            "ticker '{}' is routed to non-fetchable provider {}",
            route.ticker, provider
        )));
    }

    Ok(ResolvedRoute {
        ticker: route.ticker.clone(),
        display_name: route.display_name.clone(),
        provider,
        symbols,
        is_proxy: proxy_ticker.is_some(),
        proxy_ticker,
        optional: route.optional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::table::{DerivedComponent, DerivedOp, ProviderRoute, ProxyRoute};

    fn base(ticker: &str, provider: SourceId, symbols: &[&str]) -> TickerRoute {
        TickerRoute {
            ticker: ticker.to_string(),
            display_name: ticker.to_string(),
            primary: Some(ProviderRoute {
                provider,
                symbols: symbols.iter().map(|s| s.to_string()).collect(),
            }),
            proxy: None,
            optional: false,
        }
    }

    #[test]
    fn test_default_table_is_valid() {
        let router = TickerRouter::with_default_table().unwrap();
        assert!(!router.base_routes().is_empty());
        assert!(router.is_derived("US10Y_2Y"));
        assert!(!router.is_derived("US10Y"));
    }

    #[test]
    fn test_primary_route() {
        let router = TickerRouter::with_default_table().unwrap();
        let route = router.resolve("DXY").unwrap();
        assert_eq!(route.provider, SourceId::Stooq);
        assert_eq!(route.symbols, vec!["dx.f", "^dxy"]);
        assert!(!route.is_proxy);
    }

    #[test]
    fn test_proxy_used_when_no_primary() {
        let router = TickerRouter::with_default_table().unwrap();
        let route = router.resolve("RUT").unwrap();
        assert!(route.is_proxy);
        assert_eq!(route.ticker, "RUT");
        assert_eq!(route.proxy_ticker.as_deref(), Some("IWM"));
        assert_eq!(route.symbols, vec!["iwm.us"]);
    }

    #[test]
    fn test_primary_wins_over_proxy() {
        let mut route = base("X", SourceId::Fred, &["XSERIES"]);
        route.proxy = Some(ProxyRoute {
            ticker: "Y".to_string(),
            provider: SourceId::Stooq,
            symbols: vec!["y.us".to_string()],
        });
        let router = TickerRouter::new(RoutingTable {
            tickers: vec![route],
            derived: vec![],
        })
        .unwrap();
        let resolved = router.resolve("X").unwrap();
        assert_eq!(resolved.provider, SourceId::Fred);
        assert!(!resolved.is_proxy);
    }

    #[test]
    fn test_derived_tickers_never_resolve_to_a_provider() {
        let router = TickerRouter::with_default_table().unwrap();
        assert!(router.resolve("COPPER_GOLD").is_none());
        assert!(matches!(router.route("COPPER_GOLD"), Some(Route::Derived(_))));
        assert!(matches!(router.route("GOLD"), Some(Route::Base(_))));
        assert!(router.route("NOPE").is_none());
    }

    #[test]
    fn test_duplicate_ticker_rejected() {
        let table = RoutingTable {
            tickers: vec![
                base("A", SourceId::Fred, &["A1"]),
                base("A", SourceId::Stooq, &["a.us"]),
            ],
            derived: vec![],
        };
        assert!(TickerRouter::new(table).is_err());
    }

    #[test]
    fn test_dangling_derived_component_rejected() {
        let table = RoutingTable {
            tickers: vec![base("A", SourceId::Fred, &["A1"])],
            derived: vec![DerivedSpec::new(
                "A_B",
                "A/B",
                DerivedComponent::required("A"),
                DerivedComponent::required("B"),
                DerivedOp::Ratio,
            )],
        };
        let err = TickerRouter::new(table).err().unwrap();
        assert!(err.to_string().contains("unknown ticker 'B'"));
    }

    #[test]
    fn test_route_without_symbols_rejected() {
        let table = RoutingTable {
            tickers: vec![base("A", SourceId::Fred, &[])],
            derived: vec![],
        };
        assert!(TickerRouter::new(table).is_err());
    }

    #[test]
    fn test_routes_grouped_by_provider() {
        let router = TickerRouter::with_default_table().unwrap();
        let groups = router.routes_by_provider();
        let fred: Vec<&str> = groups[&SourceId::Fred]
            .iter()
            .map(|r| r.ticker.as_str())
            .collect();
        assert_eq!(fred, vec!["VIX", "US10Y", "US2Y", "US3M", "HY_OAS"]);
        assert_eq!(
            router.providers().into_iter().collect::<Vec<_>>(),
            vec![SourceId::Fred, SourceId::Stooq]
        );
    }

    #[test]
    fn test_display_name_covers_derived() {
        let router = TickerRouter::with_default_table().unwrap();
        assert_eq!(router.display_name("SPX"), Some("S&P 500"));
        assert_eq!(router.display_name("COPPER_GOLD"), Some("Copper/Gold Ratio"));
        assert_eq!(router.display_name("NOPE"), None);
    }
}
