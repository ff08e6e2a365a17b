//! Signal sources and the built-in simulated market.
//!
//! A signal source is anything that can scan the market and hand back trade
//! candidates. The default source is a random-walk simulator; the trait seam
//! is where a real data feed would plug in.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::audit::AuditHandle;
use crate::logger::{self, LogTag};
use crate::state::StateStore;
use crate::types::{Candle, Signal, SignalKind};

#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Scan all tracked symbols, register fresh market data, and return the
    /// actionable signals found.
    async fn scan(&self) -> Vec<Signal>;
}

/// Random-walk paper market. Prices drift by small ticks and occasionally
/// gap out entirely, which exercises the stale-data paths downstream.
pub struct SimulatedMarket {
    symbols: Vec<String>,
    last_prices: Mutex<HashMap<String, f64>>,
    state: Arc<StateStore>,
    audit: AuditHandle,
}

impl SimulatedMarket {
    pub fn new(symbols: Vec<String>, state: Arc<StateStore>, audit: AuditHandle) -> Self {
        let mut rng = rand::thread_rng();
        let mut last_prices = HashMap::new();
        for symbol in &symbols {
            let price = if symbol.contains("NIFTY") {
                rng.gen_range(20_000.0..25_000.0)
            } else {
                rng.gen_range(40_000.0..60_000.0)
            };
            last_prices.insert(symbol.clone(), price);
        }
        Self {
            symbols,
            last_prices: Mutex::new(last_prices),
            state,
            audit,
        }
    }

    /// Next simulated candle for a symbol, or `None` on a data gap.
    fn next_candle(&self, symbol: &str) -> Option<Candle> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(0.02) {
            logger::warning(
                LogTag::Signals,
                &format!("Data gap for {}, no candle this cycle", symbol),
            );
            return None;
        }

        let mut prices = match self.last_prices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let open = *prices.get(symbol)?;
        let close = open * (1.0 + rng.gen_range(-0.002..0.002));
        prices.insert(symbol.to_string(), close);

        Some(Candle {
            symbol: symbol.to_string(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: rng.gen_range(1_000u64..100_000),
            timestamp: Utc::now(),
        })
    }
}

/// Momentum read of one candle. Confidence scales with the size of the move
/// relative to a 0.1% reference tick, capped at 1.0.
pub fn evaluate_candle(candle: &Candle) -> Signal {
    let diff = candle.close - candle.open;
    let momentum = diff.abs() / (candle.open * 0.001);
    let confidence = momentum.min(1.0);

    let (kind, reason) = if diff > 0.5 && confidence > 0.6 {
        (
            SignalKind::Buy,
            format!("upward momentum {:.2} over the last candle", diff),
        )
    } else if diff < -0.5 && confidence > 0.6 {
        (
            SignalKind::Sell,
            format!("downward momentum {:.2} over the last candle", diff),
        )
    } else {
        (
            SignalKind::Hold,
            "no conviction either way".to_string(),
        )
    };

    let regime = if confidence > 0.6 { "trending" } else { "ranging" };

    Signal {
        symbol: candle.symbol.clone(),
        kind,
        price: candle.close,
        confidence,
        regime: regime.to_string(),
        reason,
    }
}

#[async_trait]
impl SignalSource for SimulatedMarket {
    async fn scan(&self) -> Vec<Signal> {
        let mut actionable = Vec::new();

        for symbol in &self.symbols {
            let Some(candle) = self.next_candle(symbol) else {
                continue;
            };
            let signal = evaluate_candle(&candle);

            self.state.mutate(|state| {
                state.market_data.insert(symbol.clone(), candle.clone());
                state.thinking.current_market = symbol.clone();
                state.thinking.signal_type = signal.kind;
                state.thinking.signal_confidence = signal.confidence;
            });
            self.audit.log_signal(&signal);

            logger::debug(
                LogTag::Signals,
                &format!(
                    "{}: {} at {:.2} (confidence {:.2})",
                    symbol, signal.kind, signal.price, signal.confidence
                ),
            );

            if signal.kind.is_actionable() {
                actionable.push(signal);
            }
        }

        actionable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::TradingConfig;
    use tempfile::tempdir;

    fn candle(open: f64, close: f64) -> Candle {
        Candle {
            symbol: "NIFTY".to_string(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 10_000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn strong_moves_produce_directional_signals() {
        let up = evaluate_candle(&candle(20_000.0, 20_030.0));
        assert_eq!(up.kind, SignalKind::Buy);
        assert_eq!(up.confidence, 1.0);

        let down = evaluate_candle(&candle(20_000.0, 19_970.0));
        assert_eq!(down.kind, SignalKind::Sell);
    }

    #[test]
    fn weak_moves_hold() {
        let flat = evaluate_candle(&candle(20_000.0, 20_005.0));
        assert_eq!(flat.kind, SignalKind::Hold);
        assert!(!flat.kind.is_actionable());
        assert!(flat.confidence < 0.6);
    }

    #[tokio::test]
    async fn scan_registers_market_data_and_records_signals() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::start(dir.path().join("audit.db")).unwrap();
        let state = Arc::new(StateStore::open(
            dir.path().join("bot_state.json"),
            &TradingConfig::default(),
            audit.handle(),
        ));
        let market = SimulatedMarket::new(
            vec!["NIFTY".to_string(), "BTCUSDT".to_string()],
            state.clone(),
            audit.handle(),
        );

        // Data gaps are 2% per symbol, so a handful of scans fills the map.
        for _ in 0..10 {
            market.scan().await;
        }

        let s = state.load();
        assert!(s.market_data.contains_key("NIFTY"));
        assert!(s.market_data.contains_key("BTCUSDT"));
        let nifty = &s.market_data["NIFTY"];
        assert!(nifty.close >= 19_000.0 && nifty.close <= 26_000.0);
    }
}
