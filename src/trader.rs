//! Main trading loop.
//!
//! One cycle every couple of seconds, in a fixed order:
//!
//! 1. Re-derive the market session from the clock.
//! 2. Scan the signal source, which also refreshes market data.
//! 3. In LIVE_MARKET, push actionable signals through the execution gate.
//! 4. Run exit checks (hard stop, mandatory time exit) and refresh the risk
//!    score.
//! 5. In FREEZE mode, force-close anything still open.
//!
//! A failed cycle is recorded in the audit trail and answered with a longer
//! sleep; the loop itself never exits except on shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::audit::AuditHandle;
use crate::config::GeneralConfig;
use crate::execution::ExecutionGate;
use crate::logger::{self, LogTag};
use crate::risk::RiskManager;
use crate::session::SessionEngine;
use crate::shutdown::SHUTDOWN;
use crate::signals::SignalSource;
use crate::state::StateStore;
use crate::types::{ExitReason, Session, SystemMode};

pub struct TradingLoop {
    state: Arc<StateStore>,
    audit: AuditHandle,
    session: SessionEngine,
    risk: RiskManager,
    gate: ExecutionGate,
    source: Arc<dyn SignalSource>,
    cycle_interval: Duration,
    error_backoff: Duration,
    first_scan_complete: bool,
}

impl TradingLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        general: &GeneralConfig,
        state: Arc<StateStore>,
        audit: AuditHandle,
        session: SessionEngine,
        risk: RiskManager,
        gate: ExecutionGate,
        source: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            state,
            audit,
            session,
            risk,
            gate,
            source,
            cycle_interval: Duration::from_secs(general.cycle_interval_secs),
            error_backoff: Duration::from_secs(general.error_backoff_secs),
            first_scan_complete: false,
        }
    }

    /// Run until shutdown is requested.
    pub async fn run(mut self) {
        logger::info(
            LogTag::Trader,
            &format!(
                "Trading loop started, cycle every {}s",
                self.cycle_interval.as_secs()
            ),
        );

        loop {
            if SHUTDOWN.is_requested() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                let msg = format!("Trading cycle failed: {:#}", e);
                logger::error(LogTag::Trader, &msg);
                self.audit.log_system("ERROR", "trader", &msg);
                tokio::select! {
                    _ = SHUTDOWN.wait() => break,
                    _ = sleep(self.error_backoff) => {}
                }
                continue;
            }

            tokio::select! {
                _ = SHUTDOWN.wait() => break,
                _ = sleep(self.cycle_interval) => {}
            }
        }

        logger::info(LogTag::Trader, "Trading loop stopped");
    }

    async fn run_cycle(&mut self) -> Result<()> {
        self.cycle_at(chrono::Local::now()).await
    }

    /// One cycle against an explicit clock.
    async fn cycle_at(&mut self, now: chrono::DateTime<chrono::Local>) -> Result<()> {
        self.session.evaluate_at(now);

        // Scanning runs in every session so market data stays fresh for exit
        // checks even outside live hours.
        let signals = self.source.scan().await;
        if !self.first_scan_complete {
            self.first_scan_complete = true;
            self.state
                .think(|thinking| thinking.current_state = "ACTIVE".to_string());
        }

        let snapshot = self.state.load();

        if snapshot.session == Session::LiveMarket {
            for signal in &signals {
                // Rejections are routine and already recorded by the gate.
                let _ = self.gate.submit(signal);
            }
        }

        self.risk.check_exits_at(now);
        self.risk.assess();

        if snapshot.system_mode == SystemMode::Freeze && snapshot.open_positions() > 0 {
            logger::warning(LogTag::Trader, "System frozen, flattening open positions");
            self.risk.close_all(ExitReason::SystemFreeze);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::Config;
    use crate::session::SessionHours;
    use crate::types::{Signal, SignalKind};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Deterministic source for loop tests: hands out a fixed queue of
    /// signals, one batch per scan.
    struct ScriptedSource {
        batches: Mutex<Vec<Vec<Signal>>>,
        state: Arc<StateStore>,
    }

    #[async_trait]
    impl SignalSource for ScriptedSource {
        async fn scan(&self) -> Vec<Signal> {
            let batch = {
                let mut batches = self.batches.lock().unwrap();
                if batches.is_empty() {
                    Vec::new()
                } else {
                    batches.remove(0)
                }
            };
            for signal in &batch {
                let signal = signal.clone();
                self.state.mutate(|s| {
                    s.market_data.insert(
                        signal.symbol.clone(),
                        crate::types::Candle {
                            symbol: signal.symbol.clone(),
                            open: signal.price,
                            high: signal.price,
                            low: signal.price,
                            close: signal.price,
                            volume: 1_000,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                });
            }
            batch
        }
    }

    fn build_loop(
        dir: &tempfile::TempDir,
        batches: Vec<Vec<Signal>>,
    ) -> (Arc<StateStore>, Arc<AuditLog>, TradingLoop) {
        let config = Config::default();
        let audit = AuditLog::start(dir.path().join("audit.db")).unwrap();
        let state = Arc::new(StateStore::open(
            dir.path().join("bot_state.json"),
            &config.trading,
            audit.handle(),
        ));
        let hours = SessionHours::from_config(&config.session).unwrap();
        let session = SessionEngine::new(hours, state.clone(), audit.handle());
        let risk = RiskManager::new(
            &config.trading,
            config.trading.mandatory_exit().unwrap(),
            state.clone(),
            audit.handle(),
        );
        let gate = ExecutionGate::new(&config.trading, state.clone(), audit.handle());
        let source = Arc::new(ScriptedSource {
            batches: Mutex::new(batches),
            state: state.clone(),
        });
        let trading_loop = TradingLoop::new(
            &config.general,
            state.clone(),
            audit.handle(),
            session,
            risk,
            gate,
            source,
        );
        (state, audit, trading_loop)
    }

    fn buy(symbol: &str, price: f64) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            kind: SignalKind::Buy,
            price,
            confidence: 0.9,
            regime: "trending".to_string(),
            reason: "scripted".to_string(),
        }
    }

    /// A weekday mid-morning instant, inside live-market hours.
    fn live_hours() -> chrono::DateTime<chrono::Local> {
        chrono::TimeZone::with_ymd_and_hms(&chrono::Local, 2026, 8, 24, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn cycle_opens_positions_during_live_market() {
        let dir = tempdir().unwrap();
        let (state, _audit, mut trading_loop) =
            build_loop(&dir, vec![vec![buy("NIFTY", 100.0)]]);

        trading_loop.cycle_at(live_hours()).await.unwrap();

        let s = state.load();
        assert_eq!(s.session, crate::types::Session::LiveMarket);
        assert_eq!(s.open_positions(), 1);
        // The gate marks the trace TRADING once a submission runs.
        assert_eq!(s.thinking.current_state, "TRADING");
    }

    #[tokio::test]
    async fn signals_outside_live_hours_still_refresh_market_data() {
        let dir = tempdir().unwrap();
        let (state, _audit, mut trading_loop) =
            build_loop(&dir, vec![vec![buy("NIFTY", 100.0)]]);

        // Saturday: market stays closed, data still lands.
        let weekend = chrono::TimeZone::with_ymd_and_hms(&chrono::Local, 2026, 8, 22, 10, 0, 0)
            .unwrap();
        trading_loop.cycle_at(weekend).await.unwrap();

        let s = state.load();
        assert_eq!(s.session, crate::types::Session::MarketClosed);
        assert_eq!(s.open_positions(), 0);
        assert!(s.market_data.contains_key("NIFTY"));
    }

    #[tokio::test]
    async fn freeze_mode_flattens_positions() {
        let dir = tempdir().unwrap();
        let (state, _audit, mut trading_loop) = build_loop(&dir, vec![vec![]]);

        // Seed an open position and a price, then freeze.
        state.mutate(|s| {
            s.session = crate::types::Session::LiveMarket;
            let trade = crate::types::Trade {
                trade_id: "TRD-frozen".to_string(),
                symbol: "NIFTY".to_string(),
                direction: crate::types::Direction::Buy,
                quantity: 4,
                entry_price: 100.0,
                entry_time: chrono::Utc::now(),
                mode: SystemMode::PaperTrading,
                signal_ref: "test".to_string(),
                status: crate::types::TradeStatus::Open,
                exit_price: None,
                pnl: None,
                exit_reason: None,
                exit_time: None,
            };
            let margin = trade.margin(s.wallet.leverage);
            s.wallet.free_balance -= margin;
            s.wallet.used_margin += margin;
            s.active_trades.insert(trade.trade_id.clone(), trade);
            s.system_mode = SystemMode::Freeze;
        });

        trading_loop.cycle_at(live_hours()).await.unwrap();

        let s = state.load();
        assert!(s.active_trades.is_empty());
        assert!(s.wallet.is_balanced());
    }
}
