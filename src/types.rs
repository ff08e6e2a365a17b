use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Global operating mode. Gates all execution paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    #[serde(rename = "PAPER_TRADING")]
    PaperTrading,
    #[serde(rename = "FREEZE")]
    Freeze,
}

impl std::fmt::Display for SystemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemMode::PaperTrading => write!(f, "PAPER_TRADING"),
            SystemMode::Freeze => write!(f, "FREEZE"),
        }
    }
}

/// Phase of the trading day, derived from wall-clock time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    #[serde(rename = "MARKET_CLOSED")]
    MarketClosed,
    #[serde(rename = "PRE_MARKET")]
    PreMarket,
    #[serde(rename = "LIVE_MARKET")]
    LiveMarket,
    #[serde(rename = "POST_MARKET")]
    PostMarket,
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::MarketClosed => write!(f, "MARKET_CLOSED"),
            Session::PreMarket => write!(f, "PRE_MARKET"),
            Session::LiveMarket => write!(f, "LIVE_MARKET"),
            Session::PostMarket => write!(f, "POST_MARKET"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "STOP_LOSS_HIT")]
    StopLossHit,
    #[serde(rename = "MANDATORY_TIME_EXIT")]
    MandatoryTimeExit,
    #[serde(rename = "SYSTEM_FREEZE")]
    SystemFreeze,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLossHit => write!(f, "STOP_LOSS_HIT"),
            ExitReason::MandatoryTimeExit => write!(f, "MANDATORY_TIME_EXIT"),
            ExitReason::SystemFreeze => write!(f, "SYSTEM_FREEZE"),
        }
    }
}

/// Latest observed candle for a symbol. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl SignalKind {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalKind::Hold)
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
            SignalKind::Hold => write!(f, "HOLD"),
        }
    }
}

/// A trade candidate produced by a signal source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub kind: SignalKind,
    pub price: f64,
    pub confidence: f64,
    pub regime: String,
    pub reason: String,
}

/// A paper position. Identity fields are set once at entry; exit fields are
/// filled exactly once when the position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub mode: SystemMode,
    pub signal_ref: String,
    pub status: TradeStatus,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Trade {
    /// Margin reserved against this position for the given wallet leverage.
    pub fn margin(&self, leverage: f64) -> f64 {
        (self.quantity as f64 * self.entry_price) / leverage
    }

    /// Direction-aware PnL against the last observed price.
    pub fn unrealized_pnl(&self, last_price: f64) -> f64 {
        let qty = self.quantity as f64;
        match self.direction {
            Direction::Buy => (last_price - self.entry_price) * qty,
            Direction::Sell => (self.entry_price - last_price) * qty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(direction: Direction) -> Trade {
        Trade {
            trade_id: "TRD-test".to_string(),
            symbol: "NIFTY".to_string(),
            direction,
            quantity: 4,
            entry_price: 100.0,
            entry_time: Utc::now(),
            mode: SystemMode::PaperTrading,
            signal_ref: "test".to_string(),
            status: TradeStatus::Open,
            exit_price: None,
            pnl: None,
            exit_reason: None,
            exit_time: None,
        }
    }

    #[test]
    fn pnl_is_direction_aware() {
        let long = sample_trade(Direction::Buy);
        assert_eq!(long.unrealized_pnl(110.0), 40.0);
        assert_eq!(long.unrealized_pnl(95.0), -20.0);

        let short = sample_trade(Direction::Sell);
        assert_eq!(short.unrealized_pnl(110.0), -40.0);
        assert_eq!(short.unrealized_pnl(95.0), 20.0);
    }

    #[test]
    fn margin_scales_with_leverage() {
        let trade = sample_trade(Direction::Buy);
        assert_eq!(trade.margin(10.0), 40.0);
        assert_eq!(trade.margin(1.0), 400.0);
    }
}
