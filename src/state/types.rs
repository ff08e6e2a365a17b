use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::TradingConfig;
use crate::types::{Candle, Session, SignalKind, SystemMode, Trade};

/// Maximum narrative lines retained in the diagnostic trace.
pub const NARRATIVE_CAPACITY: usize = 15;

/// Virtual wallet. Invariant at every quiescent point (no trade in flight):
/// `free_balance + used_margin == paper_balance` and `used_margin >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub paper_balance: f64,
    pub used_margin: f64,
    pub free_balance: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub leverage: f64,
}

impl Wallet {
    pub fn is_balanced(&self) -> bool {
        (self.free_balance + self.used_margin - self.paper_balance).abs() < 1e-6
            && self.used_margin >= -1e-9
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KillSwitch {
    pub stop_new_trades: bool,
    pub full_system_freeze: bool,
    pub blocked_symbols: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoss {
    pub limit: f64,
    pub current: f64,
    pub breached: bool,
}

impl DailyLoss {
    /// Feed a realized PnL into the day's counter. Returns true when this
    /// update newly crossed the limit. `breached` is monotonic within a day:
    /// later wins never clear it.
    pub fn apply(&mut self, pnl: f64) -> bool {
        self.current += pnl;
        if !self.breached && self.current <= -self.limit {
            self.breached = true;
            return true;
        }
        false
    }
}

/// Diagnostic trace surfaced to reporting layers. Not load-bearing for
/// correctness, but the most recent rejection reason must always be present
/// ("None" when the last submission succeeded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotThinking {
    pub current_state: String,
    pub current_market: String,
    pub signal_type: SignalKind,
    pub signal_confidence: f64,
    pub trade_decision: String,
    pub rejection_reason: String,
    pub risk_score: u32,
    /// Rolling buffer of human-readable narrative lines, newest last.
    pub narrative: VecDeque<String>,
}

impl Default for BotThinking {
    fn default() -> Self {
        Self {
            current_state: "WAITING".to_string(),
            current_market: "NONE".to_string(),
            signal_type: SignalKind::Hold,
            signal_confidence: 0.0,
            trade_decision: "Waiting for market scan...".to_string(),
            rejection_reason: "None".to_string(),
            risk_score: 0,
            narrative: VecDeque::new(),
        }
    }
}

impl BotThinking {
    /// Push a timestamped narrative line, dropping the oldest beyond capacity.
    pub fn narrate(&mut self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        self.narrative.push_back(line);
        while self.narrative.len() > NARRATIVE_CAPACITY {
            self.narrative.pop_front();
        }
    }
}

/// The entire mutable world, persisted as one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    pub system_mode: SystemMode,
    pub session: Session,
    pub wallet: Wallet,
    pub kill_switch: KillSwitch,
    pub daily_loss: DailyLoss,
    pub active_trades: HashMap<String, Trade>,
    pub market_data: HashMap<String, Candle>,
    /// Calendar day the state belongs to. A differing day at startup resets
    /// everything except persisted audit history.
    pub date: NaiveDate,
    pub thinking: BotThinking,
}

impl TradingState {
    /// Fresh state for the given trading day.
    pub fn defaults(date: NaiveDate, trading: &TradingConfig) -> Self {
        Self {
            system_mode: SystemMode::PaperTrading,
            session: Session::MarketClosed,
            wallet: Wallet {
                paper_balance: trading.paper_balance,
                used_margin: 0.0,
                free_balance: trading.paper_balance,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                leverage: trading.leverage,
            },
            kill_switch: KillSwitch::default(),
            daily_loss: DailyLoss {
                limit: trading.daily_loss_limit,
                current: 0.0,
                breached: false,
            },
            active_trades: HashMap::new(),
            market_data: HashMap::new(),
            date,
            thinking: BotThinking::default(),
        }
    }

    /// Global trading-allowed predicate: mode, kill switch, and daily loss
    /// must all permit new entries.
    pub fn can_trade_new(&self) -> bool {
        self.system_mode != SystemMode::Freeze
            && !self.kill_switch.stop_new_trades
            && !self.daily_loss.breached
    }

    pub fn open_positions(&self) -> usize {
        self.active_trades.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_loss_breach_is_monotonic() {
        let mut loss = DailyLoss {
            limit: 150.0,
            current: 0.0,
            breached: false,
        };

        assert!(!loss.apply(-100.0));
        assert!(loss.apply(-60.0));
        assert!(loss.breached);

        // A recovering day does not clear the breach.
        assert!(!loss.apply(200.0));
        assert!(loss.breached);
        assert!(loss.current > -loss.limit);
    }

    #[test]
    fn narrative_is_bounded() {
        let mut thinking = BotThinking::default();
        for i in 0..40 {
            thinking.narrate(&format!("line {}", i));
        }
        assert_eq!(thinking.narrative.len(), NARRATIVE_CAPACITY);
        assert!(thinking.narrative.back().unwrap().ends_with("line 39"));
        assert!(thinking.narrative.front().unwrap().ends_with("line 25"));
    }

    #[test]
    fn fresh_state_is_balanced_and_tradable() {
        let state = TradingState::defaults(
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            &TradingConfig::default(),
        );
        assert!(state.wallet.is_balanced());
        assert!(state.can_trade_new());
        assert_eq!(state.session, Session::MarketClosed);
        assert_eq!(state.thinking.rejection_reason, "None");
    }
}
