//! Risk & position manager.
//!
//! Owns every way a position can close: the hard stop-loss, the mandatory
//! time exit, and forced liquidation on freeze. Closing a trade is one atomic
//! state mutation so the wallet, the daily loss counter, and the kill switch
//! can never disagree about a realized PnL.

use chrono::{DateTime, Local, NaiveTime, Utc};
use std::sync::Arc;

use crate::audit::AuditHandle;
use crate::config::TradingConfig;
use crate::logger::{self, LogTag};
use crate::state::{DailyLoss, StateStore};
use crate::types::{Direction, ExitReason, Trade, TradeStatus};

/// Composite risk score surfaced in the diagnostic trace. Base of 20 for a
/// running system, up to 50 more as the daily loss approaches its limit, plus
/// 10 per open position.
pub fn risk_score(daily_loss: &DailyLoss, open_positions: usize) -> u32 {
    let mut score = 20u32;
    if daily_loss.current < 0.0 {
        let loss_frac = (-daily_loss.current / daily_loss.limit).min(1.0);
        score += (loss_frac * 50.0).round() as u32;
    }
    score + 10 * open_positions as u32
}

pub struct RiskManager {
    hard_sl_pct: f64,
    mandatory_exit: NaiveTime,
    state: Arc<StateStore>,
    audit: AuditHandle,
}

impl RiskManager {
    pub fn new(
        trading: &TradingConfig,
        mandatory_exit: NaiveTime,
        state: Arc<StateStore>,
        audit: AuditHandle,
    ) -> Self {
        Self {
            hard_sl_pct: trading.hard_sl_pct,
            mandatory_exit,
            state,
            audit,
        }
    }

    /// Refresh the risk score in the diagnostic trace.
    pub fn assess(&self) {
        let score = self.state.mutate(|state| {
            let score = risk_score(&state.daily_loss, state.open_positions());
            state.thinking.risk_score = score;
            score
        });
        logger::debug(LogTag::Risk, &format!("Risk score {}", score));
    }

    /// Evaluate every open position against the current clock and market data.
    /// Returns the trades closed by this pass.
    pub fn check_exits(&self) -> Vec<Trade> {
        self.check_exits_at(Local::now())
    }

    pub fn check_exits_at(&self, now: DateTime<Local>) -> Vec<Trade> {
        let snapshot = self.state.load();
        if snapshot.active_trades.is_empty() {
            self.state.mutate(|state| state.wallet.unrealized_pnl = 0.0);
            return Vec::new();
        }

        let time_exit_due = now.time() >= self.mandatory_exit;
        let mut to_close: Vec<(String, f64, f64, ExitReason)> = Vec::new();

        for trade in snapshot.active_trades.values() {
            // No fresh candle for the symbol: leave the position untouched
            // rather than exiting on stale data.
            let Some(candle) = snapshot.market_data.get(&trade.symbol) else {
                logger::debug(
                    LogTag::Risk,
                    &format!("No market data for {}, skipping exit checks", trade.symbol),
                );
                continue;
            };
            let last = candle.close;
            let pnl = trade.unrealized_pnl(last);

            let stop_hit = match trade.direction {
                Direction::Buy => last <= trade.entry_price * (1.0 - self.hard_sl_pct),
                Direction::Sell => last >= trade.entry_price * (1.0 + self.hard_sl_pct),
            };

            if stop_hit {
                to_close.push((trade.trade_id.clone(), last, pnl, ExitReason::StopLossHit));
            } else if time_exit_due {
                to_close.push((
                    trade.trade_id.clone(),
                    last,
                    pnl,
                    ExitReason::MandatoryTimeExit,
                ));
            }
        }

        let mut closed = Vec::new();
        for (trade_id, exit_price, pnl, reason) in to_close {
            if let Some(trade) = self.close_trade(&trade_id, exit_price, pnl, reason) {
                closed.push(trade);
            }
        }

        // Mark-to-market the survivors.
        self.state.mutate(|state| {
            state.wallet.unrealized_pnl = state
                .active_trades
                .values()
                .filter_map(|trade| {
                    state
                        .market_data
                        .get(&trade.symbol)
                        .map(|candle| trade.unrealized_pnl(candle.close))
                })
                .sum();
        });

        closed
    }

    /// Close one position. Margin release, wallet settlement, daily loss
    /// accounting, and any kill-switch trip happen in a single mutation.
    /// Returns `None` when the trade is no longer open.
    pub fn close_trade(
        &self,
        trade_id: &str,
        exit_price: f64,
        pnl: f64,
        reason: ExitReason,
    ) -> Option<Trade> {
        let result = self.state.mutate(|state| {
            let mut trade = state.active_trades.remove(trade_id)?;

            let margin = trade.margin(state.wallet.leverage);
            state.wallet.used_margin -= margin;
            state.wallet.free_balance += margin + pnl;
            state.wallet.paper_balance += pnl;
            state.wallet.realized_pnl += pnl;

            let newly_breached = state.daily_loss.apply(pnl);
            if newly_breached {
                state.kill_switch.stop_new_trades = true;
            }

            trade.status = TradeStatus::Closed;
            trade.exit_price = Some(exit_price);
            trade.pnl = Some(pnl);
            trade.exit_reason = Some(reason);
            trade.exit_time = Some(Utc::now());

            state.thinking.narrate(&format!(
                "CLOSED {} {} at {:.2} ({}), PnL {:.2}",
                trade.direction, trade.symbol, exit_price, reason, pnl
            ));

            Some((trade, newly_breached))
        });

        let (trade, newly_breached) = result?;

        self.audit.log_trade_exit(&trade);
        let verb = if pnl < 0.0 {
            "liquidating"
        } else {
            "harvesting profits from"
        };
        self.audit.log_system(
            "INFO",
            "risk",
            &format!(
                "Closed position {} by {} {} at {:.2}: PnL {:.2} ({})",
                trade.trade_id, verb, trade.symbol, exit_price, pnl, reason
            ),
        );
        logger::info(
            LogTag::Risk,
            &format!(
                "Closed {} {} at {:.2}, PnL {:.2} ({})",
                trade.direction, trade.symbol, exit_price, pnl, reason
            ),
        );

        if newly_breached {
            let msg = "Daily loss limit breached, new trades halted for the day";
            logger::warning(LogTag::Risk, msg);
            self.audit.log_system("WARNING", "risk", msg);
            self.state.narrate(msg);
        }

        Some(trade)
    }

    /// Force-close every open position at the last known price, or the entry
    /// price when no candle exists.
    pub fn close_all(&self, reason: ExitReason) -> Vec<Trade> {
        let snapshot = self.state.load();
        let mut closed = Vec::new();
        for trade in snapshot.active_trades.values() {
            let exit_price = snapshot
                .market_data
                .get(&trade.symbol)
                .map(|candle| candle.close)
                .unwrap_or(trade.entry_price);
            let pnl = trade.unrealized_pnl(exit_price);
            if let Some(trade) = self.close_trade(&trade.trade_id, exit_price, pnl, reason) {
                closed.push(trade);
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::types::{Candle, SystemMode};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn setup(dir: &tempfile::TempDir) -> (Arc<StateStore>, Arc<AuditLog>, RiskManager) {
        let audit = AuditLog::start(dir.path().join("audit.db")).unwrap();
        let trading = TradingConfig::default();
        let state = Arc::new(StateStore::open(
            dir.path().join("bot_state.json"),
            &trading,
            audit.handle(),
        ));
        let risk = RiskManager::new(
            &trading,
            trading.mandatory_exit().unwrap(),
            state.clone(),
            audit.handle(),
        );
        (state, audit, risk)
    }

    fn open_trade(state: &StateStore, symbol: &str, direction: Direction, qty: i64, entry: f64) {
        state.mutate(|s| {
            let trade = Trade {
                trade_id: format!("TRD-{}-{}", symbol, s.active_trades.len()),
                symbol: symbol.to_string(),
                direction,
                quantity: qty,
                entry_price: entry,
                entry_time: Utc::now(),
                mode: SystemMode::PaperTrading,
                signal_ref: "test".to_string(),
                status: TradeStatus::Open,
                exit_price: None,
                pnl: None,
                exit_reason: None,
                exit_time: None,
            };
            let margin = trade.margin(s.wallet.leverage);
            s.wallet.free_balance -= margin;
            s.wallet.used_margin += margin;
            s.active_trades.insert(trade.trade_id.clone(), trade);
        });
    }

    fn set_price(state: &StateStore, symbol: &str, close: f64) {
        state.mutate(|s| {
            s.market_data.insert(
                symbol.to_string(),
                Candle {
                    symbol: symbol.to_string(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000,
                    timestamp: Utc::now(),
                },
            );
        });
    }

    fn before_exit_cutoff() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 24, 11, 0, 0).unwrap()
    }

    #[test]
    fn risk_score_tracks_loss_and_exposure() {
        let limit = 150.0;
        let quiet = DailyLoss { limit, current: 0.0, breached: false };
        assert_eq!(risk_score(&quiet, 0), 20);
        assert_eq!(risk_score(&quiet, 2), 40);

        let half = DailyLoss { limit, current: -75.0, breached: false };
        assert_eq!(risk_score(&half, 0), 45);

        let past_limit = DailyLoss { limit, current: -300.0, breached: true };
        assert_eq!(risk_score(&past_limit, 1), 80);
    }

    #[test]
    fn hard_stop_closes_a_losing_long() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 4, 100.0);
        set_price(&state, "NIFTY", 99.0);

        let closed = risk.check_exits_at(before_exit_cutoff());
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLossHit));
        assert_eq!(closed[0].pnl, Some(-4.0));
        assert!(state.load().active_trades.is_empty());
    }

    #[test]
    fn stop_respects_direction_for_shorts() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Sell, 4, 100.0);

        // A falling price is profit for a short, not a stop.
        set_price(&state, "NIFTY", 99.0);
        assert!(risk.check_exits_at(before_exit_cutoff()).is_empty());

        set_price(&state, "NIFTY", 101.0);
        let closed = risk.check_exits_at(before_exit_cutoff());
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLossHit));
        assert_eq!(closed[0].pnl, Some(-4.0));
    }

    #[test]
    fn mandatory_time_exit_flattens_the_book() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 2, 100.0);
        set_price(&state, "NIFTY", 100.5);

        assert!(risk.check_exits_at(before_exit_cutoff()).is_empty());

        let after_cutoff = Local.with_ymd_and_hms(2026, 8, 24, 14, 30, 0).unwrap();
        let closed = risk.check_exits_at(after_cutoff);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::MandatoryTimeExit));
        assert_eq!(closed[0].pnl, Some(1.0));
    }

    #[test]
    fn missing_market_data_leaves_the_position_alone() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 4, 100.0);

        // Well past the time cutoff, but no candle exists for the symbol.
        let after_cutoff = Local.with_ymd_and_hms(2026, 8, 24, 15, 0, 0).unwrap();
        assert!(risk.check_exits_at(after_cutoff).is_empty());
        assert_eq!(state.load().open_positions(), 1);
    }

    #[test]
    fn closing_restores_wallet_balance() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 4, 100.0);

        let before = state.load().wallet;
        assert!(before.is_balanced());
        assert_eq!(before.used_margin, 40.0);

        let closed = risk.close_trade(
            &state.load().active_trades.keys().next().unwrap().clone(),
            105.0,
            20.0,
            ExitReason::MandatoryTimeExit,
        );
        assert!(closed.is_some());

        let after = state.load().wallet;
        assert!(after.is_balanced());
        assert_eq!(after.used_margin, 0.0);
        assert_eq!(after.paper_balance, 10_020.0);
        assert_eq!(after.realized_pnl, 20.0);
    }

    #[test]
    fn flat_round_trip_restores_the_wallet_exactly() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        let before = state.load().wallet;

        open_trade(&state, "NIFTY", Direction::Buy, 4, 100.0);
        let id = state.load().active_trades.keys().next().unwrap().clone();
        risk.close_trade(&id, 100.0, 0.0, ExitReason::MandatoryTimeExit);

        let after = state.load().wallet;
        assert_eq!(after.free_balance, before.free_balance);
        assert_eq!(after.used_margin, before.used_margin);
        assert_eq!(after.paper_balance, before.paper_balance);
        assert_eq!(after.realized_pnl, 0.0);
    }

    #[test]
    fn breach_trips_the_kill_switch_and_sticks() {
        let dir = tempdir().unwrap();
        let (state, audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 20, 100.0);
        open_trade(&state, "BANKNIFTY", Direction::Buy, 20, 100.0);

        let ids: Vec<String> = state.load().active_trades.keys().cloned().collect();
        let losing = ids.iter().find(|id| id.starts_with("TRD-NIFTY-")).unwrap().clone();
        let winning = ids.iter().find(|id| id.starts_with("TRD-BANKNIFTY-")).unwrap().clone();

        risk.close_trade(&losing, 90.0, -200.0, ExitReason::StopLossHit);
        let mid = state.load();
        assert!(mid.daily_loss.breached);
        assert!(mid.kill_switch.stop_new_trades);
        assert!(!mid.can_trade_new());

        // A later winner does not reopen the day.
        risk.close_trade(&winning, 120.0, 400.0, ExitReason::MandatoryTimeExit);
        let end = state.load();
        assert!(end.daily_loss.breached);
        assert!(end.kill_switch.stop_new_trades);

        assert!(audit.flush(Duration::from_secs(5)));
        let logs = audit.query_recent(50).unwrap();
        assert!(logs.iter().any(|r| r.message.contains("Daily loss limit breached")));
    }

    #[test]
    fn close_all_falls_back_to_entry_price() {
        let dir = tempdir().unwrap();
        let (state, _audit, risk) = setup(&dir);
        open_trade(&state, "NIFTY", Direction::Buy, 4, 100.0);
        open_trade(&state, "BTCUSDT", Direction::Sell, 1, 50_000.0);
        set_price(&state, "NIFTY", 102.0);

        let closed = risk.close_all(ExitReason::SystemFreeze);
        assert_eq!(closed.len(), 2);
        let flat = closed.iter().find(|t| t.symbol == "BTCUSDT").unwrap();
        assert_eq!(flat.pnl, Some(0.0));
        assert!(state.load().active_trades.is_empty());
        assert!(state.load().wallet.is_balanced());
    }
}
