use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;
use crate::domain::genome::{GeneKind, GENOME_LAYOUT, STOP_LOSS, TAKE_PROFIT};
use crate::error::{AateError, Result};
use crate::evaluator::EvaluatorConfig;
use crate::ga::GaConfig;
use crate::rl::RlConfig;

/// Main configuration structure.
///
/// Loaded once at startup and handed to each component by value; there is
/// no process-wide settings instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub data: DataConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub evaluator: EvaluatorConfig,
    pub ga: GaConfig,
    pub rl: RlConfig,
    pub coordinator: CoordinatorConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            data: DataConfig::default(),
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            evaluator: EvaluatorConfig::default(),
            ga: GaConfig::default(),
            rl: RlConfig::default(),
            coordinator: CoordinatorConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Trading operation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Replay a finite data file, then stop
    Backtest,
    /// Run the feedback loop continuously without an execution venue
    Paper,
    /// Same loop; promoted strategies are handed to an external router
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub mode: TradingMode,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Autonomous Adaptive Trading Engine".to_string(),
            mode: TradingMode::Paper,
        }
    }
}

/// Market data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Symbols to subscribe to
    pub symbols: Vec<String>,
    /// JSON-lines file of observations to replay
    pub replay_path: Option<PathBuf>,
    /// Delay between polls when the connector has nothing new (ms)
    pub poll_interval_ms: u64,
    /// Live queue capacity per subscriber before oldest records are dropped
    pub live_capacity: usize,
    /// Observations retained per symbol for windows and cursor restarts
    pub history_capacity: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTC/USDT".to_string(),
                "ETH/USDT".to_string(),
                "SOL/USDT".to_string(),
            ],
            replay_path: None,
            poll_interval_ms: 60_000,
            live_capacity: 1024,
            history_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Capital each evaluation starts with
    pub initial_capital: Decimal,
    /// Stop loss seeded into default strategies (e.g., 0.02 = 2%)
    pub stop_loss_pct: f64,
    /// Take profit seeded into default strategies (e.g., 0.05 = 5%)
    pub take_profit_pct: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(10_000, 0),
            stop_loss_pct: 0.02,
            take_profit_pct: 0.05,
        }
    }
}

/// Risk limits enforced by the simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum fraction of equity in one position, in (0, 1]
    pub max_position_size: f64,
    /// Drawdown that terminates an evaluation early
    pub max_drawdown_pct: f64,
    /// Intraday loss that flattens and blocks entries until the next day
    pub max_daily_loss_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.1,
            max_drawdown_pct: 0.15,
            max_daily_loss_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for the file backend
    pub path: Option<PathBuf>,
    /// PostgreSQL connection URL
    pub url: Option<String>,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Engine events buffered before a batch append
    pub event_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            url: None,
            max_connections: 5,
            event_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily-rolling log files; console only when unset
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AATE_GA__MUTATION_RATE, etc.)
            .add_source(
                Environment::with_prefix("AATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("data.symbols"),
            );

        builder.build()?.try_deserialize()
    }

    /// Load and validate; invalid ranges prevent startup
    pub fn load_validated<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config = Self::load_from(config_dir)?;
        config.validate().map_err(AateError::ConfigurationInvalid)?;
        Ok(config)
    }

    /// Symbol the coordinator evaluates on
    pub fn primary_symbol(&self) -> Option<&str> {
        self.coordinator
            .symbol
            .as_deref()
            .or_else(|| self.data.symbols.first().map(String::as_str))
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Data
        if self.data.symbols.is_empty() {
            errors.push("data.symbols must not be empty".to_string());
        }
        if self.data.live_capacity == 0 {
            errors.push("data.live_capacity must be positive".to_string());
        }
        if self.data.history_capacity < self.coordinator.window_len {
            errors.push(format!(
                "data.history_capacity ({}) must hold a full coordinator window ({})",
                self.data.history_capacity, self.coordinator.window_len
            ));
        }
        if self.app.mode == TradingMode::Backtest && self.data.replay_path.is_none() {
            errors.push("backtest mode requires data.replay_path".to_string());
        }

        // Trading
        if self.trading.initial_capital <= Decimal::ZERO {
            errors.push("trading.initial_capital must be positive".to_string());
        }
        check_gene_bounds(&mut errors, "trading.stop_loss_pct", STOP_LOSS, self.trading.stop_loss_pct);
        check_gene_bounds(
            &mut errors,
            "trading.take_profit_pct",
            TAKE_PROFIT,
            self.trading.take_profit_pct,
        );

        // Risk
        if !(self.risk.max_position_size > 0.0 && self.risk.max_position_size <= 1.0) {
            errors.push("risk.max_position_size must be between 0 and 1".to_string());
        }
        if !(self.risk.max_drawdown_pct > 0.0 && self.risk.max_drawdown_pct < 1.0) {
            errors.push("risk.max_drawdown_pct must be within (0, 1)".to_string());
        }
        if !(self.risk.max_daily_loss_pct > 0.0 && self.risk.max_daily_loss_pct < 1.0) {
            errors.push("risk.max_daily_loss_pct must be within (0, 1)".to_string());
        }

        self.evaluator.validate(&mut errors);
        self.ga.validate(&mut errors);
        self.rl.validate(&mut errors);
        self.coordinator.validate(&self.evaluator, &mut errors);

        if let Some(symbol) = self.coordinator.symbol.as_ref() {
            if !self.data.symbols.contains(symbol) {
                errors.push(format!("coordinator.symbol {symbol} is not in data.symbols"));
            }
        }

        // Store
        match self.store.backend {
            StoreBackend::File if self.store.path.is_none() => {
                errors.push("store.path is required for the file backend".to_string());
            }
            StoreBackend::Postgres if self.store.url.is_none() => {
                errors.push("store.url is required for the postgres backend".to_string());
            }
            _ => {}
        }
        if self.store.event_batch_size == 0 {
            errors.push("store.event_batch_size must be positive".to_string());
        }

        // Logging
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!("logging.level {} is not a valid level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_gene_bounds(errors: &mut Vec<String>, field: &str, gene: usize, value: f64) {
    if let GeneKind::Real { min, max } = GENOME_LAYOUT[gene].kind {
        if !(value >= min && value <= max) {
            errors.push(format!("{field} must be within [{min}, {max}]"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_mutation_rate_outside_unit_interval_is_rejected() {
        let mut config = AppConfig::default();
        config.ga.mutation_rate = 1.5;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("ga.mutation_rate")));
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = AppConfig::default();
        config.risk.max_position_size = 0.0;
        config.ga.crossover_rate = -0.1;
        config.rl.gamma = 1.5;
        config.store.backend = StoreBackend::Postgres;
        let errors = config.validate().unwrap_err();
        assert!(errors.len() >= 4, "{errors:?}");
    }

    #[test]
    fn test_primary_symbol_defaults_to_first() {
        let config = AppConfig::default();
        assert_eq!(config.primary_symbol(), Some("BTC/USDT"));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = std::env::temp_dir().join(format!("aate_cfg_{}", uuid::Uuid::new_v4()));
        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.ga.population_size, 50);
        assert_eq!(config.app.mode, TradingMode::Paper);
    }
}
