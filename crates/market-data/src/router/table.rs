//! Routing table: which provider serves which logical ticker, under which
//! symbol spellings, and how derived tickers are composed.
//!
//! The table is configuration. A JSON file can replace the built-in default
//! entirely:
//!
//! ```json
//! {
//!   "tickers": [
//!     { "ticker": "US10Y", "displayName": "10Y Treasury Yield",
//!       "primary": { "provider": "FRED", "symbols": ["DGS10"] } },
//!     { "ticker": "RUT", "displayName": "Russell 2000", "optional": true,
//!       "proxy": { "ticker": "IWM", "provider": "STOOQ", "symbols": ["iwm.us"] } }
//!   ],
//!   "derived": [
//!     { "ticker": "US10Y_2Y", "displayName": "10Y-2Y Spread", "op": "spread",
//!       "a": { "ticker": "US10Y" }, "b": { "ticker": "US2Y" } }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::{ProviderSymbol, SourceId, Ticker};

/// Provider and candidate symbols for a ticker, tried in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRoute {
    pub provider: SourceId,
    pub symbols: Vec<ProviderSymbol>,
}

/// Stand-in ticker used when no primary mapping exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub ticker: Ticker,
    pub provider: SourceId,
    pub symbols: Vec<ProviderSymbol>,
}

/// One base ticker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRoute {
    pub ticker: Ticker,
    pub display_name: String,
    #[serde(default)]
    pub primary: Option<ProviderRoute>,
    #[serde(default)]
    pub proxy: Option<ProxyRoute>,
    /// Losing this ticker does not warrant a user-visible warning.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedOp {
    /// `a / b`
    Ratio,
    /// `a - b`
    Spread,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedComponent {
    pub ticker: Ticker,
    #[serde(default)]
    pub optional: bool,
}

impl DerivedComponent {
    pub fn required(ticker: impl Into<Ticker>) -> Self {
        Self {
            ticker: ticker.into(),
            optional: false,
        }
    }

    pub fn optional(ticker: impl Into<Ticker>) -> Self {
        Self {
            ticker: ticker.into(),
            optional: true,
        }
    }
}

/// A ticker computed from two other tickers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSpec {
    pub ticker: Ticker,
    pub display_name: String,
    pub a: DerivedComponent,
    pub b: DerivedComponent,
    pub op: DerivedOp,
}

impl DerivedSpec {
    pub fn new(
        ticker: impl Into<Ticker>,
        display_name: impl Into<String>,
        a: DerivedComponent,
        b: DerivedComponent,
        op: DerivedOp,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            display_name: display_name.into(),
            a,
            b,
            op,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    pub tickers: Vec<TickerRoute>,
    #[serde(default)]
    pub derived: Vec<DerivedSpec>,
}

fn primary(ticker: &str, name: &str, provider: SourceId, symbols: &[&str]) -> TickerRoute {
    TickerRoute {
        ticker: ticker.to_string(),
        display_name: name.to_string(),
        primary: Some(ProviderRoute {
            provider,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }),
        proxy: None,
        optional: false,
    }
}

impl RoutingTable {
    /// Parse a table from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, MarketDataError> {
        serde_json::from_str(json)
            .map_err(|e| MarketDataError::InvalidConfig(format!("routing table: {}", e)))
    }

    /// Read a table from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, MarketDataError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MarketDataError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Built-in table: Stooq for market prices, FRED for rates and spreads.
    pub fn default_table() -> Self {
        use SourceId::{Fred, Stooq};

        let tickers = vec![
            primary("SPX", "S&P 500", Stooq, &["^spx"]),
            primary("NDX", "Nasdaq 100", Stooq, &["^ndx"]),
            TickerRoute {
                ticker: "RUT".to_string(),
                display_name: "Russell 2000".to_string(),
                primary: None,
                proxy: Some(ProxyRoute {
                    ticker: "IWM".to_string(),
                    provider: Stooq,
                    symbols: vec!["iwm.us".to_string()],
                }),
                optional: true,
            },
            primary("VIX", "CBOE Volatility Index", Fred, &["VIXCLS"]),
            primary("DXY", "US Dollar Index", Stooq, &["dx.f", "^dxy"]),
            primary("US10Y", "10Y Treasury Yield", Fred, &["DGS10"]),
            primary("US2Y", "2Y Treasury Yield", Fred, &["DGS2"]),
            primary("US3M", "3M Treasury Yield", Fred, &["DGS3MO", "DTB3"]),
            primary("HY_OAS", "High Yield OAS", Fred, &["BAMLH0A0HYM2"]),
            primary("GOLD", "Gold", Stooq, &["xauusd", "gc.f"]),
            primary("COPPER", "Copper", Stooq, &["hg.f"]),
            primary("WTI", "WTI Crude", Stooq, &["cl.f"]),
        ];

        let derived = vec![
            DerivedSpec::new(
                "US10Y_2Y",
                "10Y-2Y Treasury Spread",
                DerivedComponent::required("US10Y"),
                DerivedComponent::required("US2Y"),
                DerivedOp::Spread,
            ),
            DerivedSpec::new(
                "US10Y_3M",
                "10Y-3M Treasury Spread",
                DerivedComponent::required("US10Y"),
                DerivedComponent::optional("US3M"),
                DerivedOp::Spread,
            ),
            DerivedSpec::new(
                "COPPER_GOLD",
                "Copper/Gold Ratio",
                DerivedComponent::required("COPPER"),
                DerivedComponent::required("GOLD"),
                DerivedOp::Ratio,
            ),
            DerivedSpec::new(
                "RUT_SPX",
                "Small/Large Cap Ratio",
                DerivedComponent::optional("RUT"),
                DerivedComponent::required("SPX"),
                DerivedOp::Ratio,
            ),
        ];

        Self { tickers, derived }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_table() {
        let json = r#"{
            "tickers": [
                { "ticker": "US10Y", "displayName": "10Y",
                  "primary": { "provider": "FRED", "symbols": ["DGS10"] } },
                { "ticker": "RUT", "displayName": "Russell", "optional": true,
                  "proxy": { "ticker": "IWM", "provider": "STOOQ", "symbols": ["iwm.us"] } }
            ],
            "derived": [
                { "ticker": "X", "displayName": "X", "op": "ratio",
                  "a": { "ticker": "US10Y" }, "b": { "ticker": "RUT", "optional": true } }
            ]
        }"#;

        let table = RoutingTable::from_json_str(json).unwrap();
        assert_eq!(table.tickers.len(), 2);
        assert_eq!(
            table.tickers[0].primary.as_ref().unwrap().provider,
            SourceId::Fred
        );
        assert!(table.tickers[1].optional);
        assert!(table.tickers[1].primary.is_none());
        assert_eq!(table.derived[0].op, DerivedOp::Ratio);
        assert!(!table.derived[0].a.optional);
        assert!(table.derived[0].b.optional);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = RoutingTable::from_json_str("{ \"tickers\": 3 }").unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidConfig(_)));
    }

    #[test]
    fn test_default_table_round_trips_through_json() {
        let table = RoutingTable::default_table();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(RoutingTable::from_json_str(&json).unwrap(), table);
    }
}
