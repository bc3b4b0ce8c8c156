use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000_000.0;
pub const DEFAULT_EXCHANGE_RATE: f64 = 16_000.0;

/// Capital and currency conversion shared by backtests and the paper trader
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub exchange_rate: f64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            exchange_rate: DEFAULT_EXCHANGE_RATE,
        }
    }
}

/// Knobs of the paper-trading polling loop
#[derive(Debug, Clone, PartialEq)]
pub struct PaperTradingConfig {
    pub interval: String,
    pub history_limit: usize,
    pub poll_interval: Duration,
    pub empty_retry_delay: Duration,
    pub take_profit_ratio: f64,
    pub stop_loss_ratio: f64,
    pub position_fraction: f64,
    pub signal_freshness: chrono::Duration,
    pub exchange_rate: f64,
    pub initial_capital: f64,
    pub trades_file: PathBuf,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            interval: "1m".to_string(),
            history_limit: 50,
            poll_interval: Duration::from_millis(2_000),
            empty_retry_delay: Duration::from_millis(5_000),
            take_profit_ratio: 0.02,
            stop_loss_ratio: 0.01,
            position_fraction: 0.1,
            signal_freshness: chrono::Duration::seconds(3_600),
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            trades_file: PathBuf::from("paper_trades.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub backtest: BacktestSettings,
    pub paper: PaperTradingConfig,
}

impl EngineSettings {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars().collect();
        Self::from_settings_map(&settings)
    }

    /// Every key is optional; blank values fall back to the default.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = PaperTradingConfig::default();

        let initial_capital = setting_f64(
            settings,
            "INITIAL_CAPITAL",
            DEFAULT_INITIAL_CAPITAL,
            Some(0.0),
            None,
        )?;
        let exchange_rate =
            setting_f64(settings, "EXCHANGE_RATE", DEFAULT_EXCHANGE_RATE, None, None)?;
        if exchange_rate <= 0.0 {
            return Err(anyhow!(
                "Setting EXCHANGE_RATE must be > 0 (value: {})",
                exchange_rate
            ));
        }

        let interval = optional_setting(settings, "PAPER_INTERVAL")
            .map(str::to_string)
            .unwrap_or(defaults.interval);
        let history_limit = setting_usize(settings, "PAPER_HISTORY_LIMIT", defaults.history_limit, 3)?;
        let poll_interval_ms = setting_usize(settings, "PAPER_POLL_INTERVAL_MS", 2_000, 1)?;
        let empty_retry_ms = setting_usize(settings, "PAPER_EMPTY_RETRY_MS", 5_000, 1)?;
        let take_profit_ratio = setting_f64(
            settings,
            "PAPER_TAKE_PROFIT_RATIO",
            defaults.take_profit_ratio,
            Some(0.0),
            None,
        )?;
        let stop_loss_ratio = setting_f64(
            settings,
            "PAPER_STOP_LOSS_RATIO",
            defaults.stop_loss_ratio,
            Some(0.0),
            Some(1.0),
        )?;
        let position_fraction = setting_f64(
            settings,
            "PAPER_POSITION_FRACTION",
            defaults.position_fraction,
            Some(0.0),
            Some(1.0),
        )?;
        let freshness_secs = setting_usize(settings, "PAPER_SIGNAL_FRESHNESS_SECS", 3_600, 1)?;
        let trades_file = optional_setting(settings, "PAPER_TRADES_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.trades_file);

        Ok(Self {
            backtest: BacktestSettings {
                initial_capital,
                exchange_rate,
            },
            paper: PaperTradingConfig {
                interval,
                history_limit,
                poll_interval: Duration::from_millis(poll_interval_ms as u64),
                empty_retry_delay: Duration::from_millis(empty_retry_ms as u64),
                take_profit_ratio,
                stop_loss_ratio,
                position_fraction,
                signal_freshness: chrono::Duration::seconds(freshness_secs as i64),
                exchange_rate,
                initial_capital,
                trades_file,
            },
        })
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value as usize)
}
