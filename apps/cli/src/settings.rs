use chrono::NaiveDate;
use pulse_market_data::models::DEFAULT_REFRESH_INTERVAL_SECS;
use pulse_market_data::FetchSettings;

/// Command line behavior, read from the environment like the rest of the
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CliSettings {
    pub watch: bool,
    pub fetch: FetchSettings,
}

impl CliSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let date = |name: &str| {
            text(name).and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
        };
        let defaults = FetchSettings::default();

        Self {
            watch: text("PULSE_WATCH")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            fetch: FetchSettings {
                refresh_interval_secs: text("PULSE_REFRESH_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
                weight_preset: text("PULSE_WEIGHT_PRESET").unwrap_or(defaults.weight_preset),
                timeframe_start: date("PULSE_TIMEFRAME_START"),
                timeframe_end: date("PULSE_TIMEFRAME_END"),
            },
        }
    }
}
