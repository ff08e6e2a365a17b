use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logger::{self, LogTag};

/// Runtime configuration loaded from a JSON file.
///
/// Every section has defaults, so a missing config file means "run with
/// defaults" while a malformed one is a startup error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Starting paper balance for a fresh trading day.
    pub paper_balance: f64,
    pub leverage: f64,
    /// Capital risked per trade, before leverage.
    pub max_risk_per_trade: f64,
    /// Cumulative realized loss that trips the daily kill switch.
    pub daily_loss_limit: f64,
    /// Hard stop-loss as a fraction of entry price.
    pub hard_sl_pct: f64,
    /// Local time after which every open position is force-closed ("HH:MM").
    pub mandatory_exit_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub pre_market_start: String,
    pub market_open: String,
    pub market_close: String,
    pub post_market_end: String,
    /// Interval between session heartbeat audit events.
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub cycle_interval_secs: u64,
    /// Extra sleep after a failed trading cycle.
    pub error_backoff_secs: u64,
    /// How long shutdown waits for the audit queue to drain.
    pub audit_drain_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trading: TradingConfig::default(),
            session: SessionConfig::default(),
            general: GeneralConfig::default(),
            symbols: default_symbols(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            paper_balance: 10_000.0,
            leverage: 10.0,
            max_risk_per_trade: 1_000.0,
            daily_loss_limit: 150.0,
            hard_sl_pct: 0.01,
            mandatory_exit_time: "14:30".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pre_market_start: "09:00".to_string(),
            market_open: "09:15".to_string(),
            market_close: "15:30".to_string(),
            post_market_end: "16:00".to_string(),
            heartbeat_secs: 900,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 2,
            error_backoff_secs: 5,
            audit_drain_grace_secs: 5,
        }
    }
}

fn default_symbols() -> Vec<String> {
    vec![
        "NIFTY".to_string(),
        "BANKNIFTY".to_string(),
        "BTCUSDT".to_string(),
    ]
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            logger::info(
                LogTag::System,
                &format!("No config at {}, using defaults", path.display()),
            );
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

impl TradingConfig {
    pub fn mandatory_exit(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.mandatory_exit_time)
    }
}

/// Parse a wall-clock "HH:MM" config value.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("invalid time of day {:?}, expected HH:MM", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        assert_eq!(config.trading.paper_balance, 10_000.0);
        assert_eq!(config.trading.leverage, 10.0);
        assert_eq!(config.symbols.len(), 3);
        assert!(config.trading.mandatory_exit().is_ok());
    }

    #[test]
    fn rejects_malformed_time() {
        assert!(parse_hhmm("14:30").is_ok());
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("noon").is_err());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"symbols": ["NIFTY"]}"#).unwrap();
        assert_eq!(parsed.symbols, vec!["NIFTY".to_string()]);
        assert_eq!(parsed.trading.daily_loss_limit, 150.0);
        assert_eq!(parsed.session.heartbeat_secs, 900);
    }
}
