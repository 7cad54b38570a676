// auction_core/src/config.rs
//
// Layered configuration: defaults, then an optional `AuctionCore.toml`,
// then environment variables prefixed `AUCTION_` (e.g. `AUCTION_TRADING__MIN_PRICE`).
// `.env` is loaded first via dotenvy so local overrides behave the same way
// the original's `python-dotenv` + `config.py` pair did.

use serde::Deserialize;

/// Trading universe and tick-size limits, mirrors the original's TRADING_CONFIG.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub min_price: f64,
    pub max_price: f64,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub price_tick: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "AAPL", "GOOGL", "MSFT", "AMZN", "TSLA", "META", "NVDA", "JPM",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_price: 50.0,
            max_price: 500.0,
            min_quantity: 10,
            max_quantity: 1000,
            price_tick: 0.01,
        }
    }
}

/// Target performance thresholds, mirrors the original's PERFORMANCE_CONFIG.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub target_matching_latency_ms: f64,
    pub target_report_time_ms: f64,
    pub target_reconciliation_accuracy: f64,
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_matching_latency_ms: 50.0,
            target_report_time_ms: 600.0,
            target_reconciliation_accuracy: 99.9,
            batch_size: 1000,
        }
    }
}

/// Simulator/load-generator defaults, mirrors the original's TEST_CONFIG.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub num_orders: u32,
    pub num_users: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            num_orders: 10_000,
            num_users: 100,
        }
    }
}

/// Logging verbosity, mirrors the original's LOGGING_CONFIG level field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trading: TradingConfig,
    pub performance: PerformanceConfig,
    pub simulator: SimulatorConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from (in ascending priority) built-in defaults, an
    /// optional `AuctionCore.toml` in the working directory, and `AUCTION_*`
    /// environment variables. Never fails on a missing file; only on a
    /// present-but-malformed one.
    pub fn load() -> Result<Self, crate::error::ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("AuctionCore").required(false))
            .add_source(
                config::Environment::with_prefix("AUCTION")
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg = builder.build()?;
        // An absent file/env layer yields an empty table; deserialize onto
        // our Default impls so missing keys fall back correctly.
        let settings: Settings = cfg.try_deserialize().unwrap_or_default();
        Ok(settings)
    }

    /// Initialize the `env_logger` backend at the configured level. Call once
    /// at process start; safe to call more than once (subsequent calls are
    /// no-ops per `env_logger`'s own guard).
    pub fn init_logging(&self) {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.logging.level),
        )
        .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_trading_config() {
        let t = TradingConfig::default();
        assert_eq!(t.symbols.len(), 8);
        assert_eq!(t.min_price, 50.0);
        assert_eq!(t.max_price, 500.0);
    }

    #[test]
    fn test_defaults_match_original_simulator_config() {
        let s = SimulatorConfig::default();
        assert_eq!(s.num_orders, 10_000);
        assert_eq!(s.num_users, 100);
    }

    #[test]
    fn test_load_without_file_or_env_uses_defaults() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.trading.symbols.len(), 8);
        assert_eq!(settings.performance.batch_size, 1000);
    }
}
