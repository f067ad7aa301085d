mod settings;

use std::sync::Arc;

use pulse_market_data::{Aggregator, FetchSettings, MarketDataConfig};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use settings::CliSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = MarketDataConfig::from_env();
    let cli = CliSettings::from_env();
    let aggregator = Arc::new(Aggregator::from_config(&config)?);

    info!(
        "Routing {} base tickers and {} derived tickers",
        aggregator.router().base_routes().len(),
        aggregator.router().derived_specs().len()
    );

    if cli.watch {
        watch(aggregator, cli.fetch).await
    } else {
        print_snapshot(&aggregator, &cli.fetch).await
    }
}

fn init_tracing() {
    let log_format = std::env::var("PULSE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

async fn print_snapshot(aggregator: &Aggregator, settings: &FetchSettings) -> anyhow::Result<()> {
    let snapshot = aggregator.fetch_all(settings).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Refresh on the configured interval until interrupted.
async fn watch(aggregator: Arc<Aggregator>, settings: FetchSettings) -> anyhow::Result<()> {
    let period = Duration::from_secs(settings.refresh_interval_secs.max(1));
    info!("Watching indicators every {:?}", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = print_snapshot(&aggregator, &settings).await {
                    error!("Refresh failed: {}", e);
                }
                let diagnostics = aggregator.cache_diagnostics();
                info!(
                    "Caches: {} snapshots, {} quotes, {} providers cooling down",
                    diagnostics.snapshots.entry_count,
                    diagnostics.quotes.as_ref().map(|q| q.entry_count).unwrap_or(0),
                    diagnostics.cooldowns.len()
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pulse_market_data::{RoutingTable, SourceId, TickerRouter};

    #[test]
    fn test_example_routing_table_is_valid() {
        let table = RoutingTable::from_json_str(include_str!("../routing.example.json")).unwrap();
        let router = TickerRouter::new(table).unwrap();

        assert_eq!(router.resolve("SPX").unwrap().provider, SourceId::Finnhub);
        assert!(router.resolve("RUT").unwrap().is_proxy);
        assert!(router.is_derived("COPPER_GOLD"));
    }
}
