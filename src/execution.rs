//! Execution gate: the only entry point for new positions.
//!
//! Every submission runs its full validation chain and, on success, the
//! margin reservation and trade insertion inside one state mutation, so two
//! concurrent signals can never both spend the same free balance.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditHandle;
use crate::config::TradingConfig;
use crate::logger::{self, LogTag};
use crate::state::{StateStore, TradingState};
use crate::types::{Direction, Session, Signal, SignalKind, Trade, TradeStatus};

/// Why a signal was refused. Rejections are normal flow, not faults.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradeRejection {
    #[error("signal is not actionable: {0}")]
    NotActionable(String),
    #[error("symbol {0} is blocked by the kill switch")]
    SymbolBlocked(String),
    #[error("market session is {0}, trading requires LIVE_MARKET")]
    SessionClosed(Session),
    #[error("new trades are halted (freeze, kill switch, or daily loss breach)")]
    TradingHalted,
    #[error("insufficient capital: {0}")]
    InsufficientCapital(String),
    #[error("required margin {required:.2} exceeds free balance {free:.2}")]
    MarginExceedsFreeBalance { required: f64, free: f64 },
}

pub struct ExecutionGate {
    max_risk_per_trade: f64,
    state: Arc<StateStore>,
    audit: AuditHandle,
}

impl ExecutionGate {
    pub fn new(trading: &TradingConfig, state: Arc<StateStore>, audit: AuditHandle) -> Self {
        Self {
            max_risk_per_trade: trading.max_risk_per_trade,
            state,
            audit,
        }
    }

    /// Validate and, if everything passes, open a paper position.
    pub fn submit(&self, signal: &Signal) -> Result<Trade, TradeRejection> {
        let result = self.state.mutate(|state| self.try_open(state, signal));
        match &result {
            Ok(trade) => {
                logger::info(
                    LogTag::Execution,
                    &format!(
                        "Opened {} {} x{} at {:.2}",
                        trade.direction, trade.symbol, trade.quantity, trade.entry_price
                    ),
                );
                self.audit.log_trade_entry(trade);
            }
            Err(rejection) => {
                logger::info(
                    LogTag::Execution,
                    &format!("Rejected {} signal for {}: {}", signal.kind, signal.symbol, rejection),
                );
            }
        }
        result
    }

    /// The validation chain, run under the write lock. Order matters: cheap
    /// structural checks first, capital checks last.
    fn try_open(&self, state: &mut TradingState, signal: &Signal) -> Result<Trade, TradeRejection> {
        let direction = match signal.kind {
            SignalKind::Buy => Direction::Buy,
            SignalKind::Sell => Direction::Sell,
            SignalKind::Hold => {
                return Err(reject(
                    state,
                    TradeRejection::NotActionable(format!("{} is not tradable", signal.kind)),
                ));
            }
        };

        if state.kill_switch.blocked_symbols.contains(&signal.symbol) {
            return Err(reject(state, TradeRejection::SymbolBlocked(signal.symbol.clone())));
        }

        if state.session != Session::LiveMarket {
            return Err(reject(state, TradeRejection::SessionClosed(state.session)));
        }

        state.thinking.current_state = "TRADING".to_string();

        if !state.can_trade_new() {
            return Err(reject(state, TradeRejection::TradingHalted));
        }

        // Position sizing: risk capital times leverage, bounded by what the
        // free balance can actually carry, floored to whole units.
        let leverage = state.wallet.leverage;
        let deployable = (self.max_risk_per_trade * leverage)
            .min(state.wallet.free_balance * leverage);
        let quantity = (deployable / signal.price).floor() as i64;
        if quantity < 1 {
            return Err(reject(
                state,
                TradeRejection::InsufficientCapital(format!(
                    "free balance {:.2} cannot buy one unit of {} at {:.2}",
                    state.wallet.free_balance, signal.symbol, signal.price
                )),
            ));
        }

        let required = (quantity as f64 * signal.price) / leverage;
        if required > state.wallet.free_balance {
            return Err(reject(
                state,
                TradeRejection::MarginExceedsFreeBalance {
                    required,
                    free: state.wallet.free_balance,
                },
            ));
        }

        let trade = Trade {
            trade_id: format!("TRD-{}", Uuid::new_v4().as_simple()),
            symbol: signal.symbol.clone(),
            direction,
            quantity,
            entry_price: signal.price,
            entry_time: Utc::now(),
            mode: state.system_mode,
            signal_ref: signal.reason.clone(),
            status: TradeStatus::Open,
            exit_price: None,
            pnl: None,
            exit_reason: None,
            exit_time: None,
        };

        state.wallet.free_balance -= required;
        state.wallet.used_margin += required;
        state
            .active_trades
            .insert(trade.trade_id.clone(), trade.clone());

        state.thinking.trade_decision = format!(
            "Opened {} {} x{} at {:.2}",
            direction, trade.symbol, quantity, trade.entry_price
        );
        state.thinking.rejection_reason = "None".to_string();
        state.thinking.narrate(&format!(
            "OPENED {} {} x{} at {:.2}, margin {:.2}",
            direction, trade.symbol, quantity, trade.entry_price, required
        ));

        Ok(trade)
    }
}

/// Record the rejection in the diagnostic trace and pass it through.
fn reject(state: &mut TradingState, rejection: TradeRejection) -> TradeRejection {
    state.thinking.rejection_reason = rejection.to_string();
    state.thinking.narrate(&format!("Trade rejected: {}", rejection));
    rejection
}
