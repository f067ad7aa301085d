//! Ticker routing.
//!
//! - [`RoutingTable`] - Configuration: provider and candidate symbols per
//!   ticker, proxies, derived ticker definitions
//! - [`TickerRouter`] - Validated lookup over a table

mod table;
mod ticker_router;

pub use table::{
    DerivedComponent, DerivedOp, DerivedSpec, ProviderRoute, ProxyRoute, RoutingTable, TickerRoute,
};
pub use ticker_router::{ResolvedRoute, Route, TickerRouter};
