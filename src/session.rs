//! Session state machine.
//!
//! The market session is a pure function of local wall-clock time: weekends
//! are always closed, weekdays walk PRE_MARKET -> LIVE_MARKET -> POST_MARKET
//! between the configured boundaries. The engine only commits and announces a
//! transition when the derived session differs from the stored one, so
//! re-evaluating the same instant twice is a no-op.

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audit::AuditHandle;
use crate::config::{parse_hhmm, SessionConfig};
use crate::logger::{self, LogTag};
use crate::state::StateStore;
use crate::types::Session;

/// Parsed session boundaries.
#[derive(Debug, Clone, Copy)]
pub struct SessionHours {
    pub pre_market_start: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    pub post_market_end: NaiveTime,
    pub heartbeat: Duration,
}

impl SessionHours {
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            pre_market_start: parse_hhmm(&config.pre_market_start)?,
            market_open: parse_hhmm(&config.market_open)?,
            market_close: parse_hhmm(&config.market_close)?,
            post_market_end: parse_hhmm(&config.post_market_end)?,
            heartbeat: Duration::from_secs(config.heartbeat_secs),
        })
    }

    /// Derive the session for an instant. Pure; never consults stored state.
    pub fn classify(&self, now: DateTime<Local>) -> Session {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return Session::MarketClosed;
        }
        let t = now.time();
        if t < self.pre_market_start {
            Session::MarketClosed
        } else if t < self.market_open {
            Session::PreMarket
        } else if t < self.market_close {
            Session::LiveMarket
        } else if t < self.post_market_end {
            Session::PostMarket
        } else {
            Session::MarketClosed
        }
    }
}

pub struct SessionEngine {
    hours: SessionHours,
    state: Arc<StateStore>,
    audit: AuditHandle,
    last_heartbeat: Mutex<Option<DateTime<Local>>>,
}

impl SessionEngine {
    pub fn new(hours: SessionHours, state: Arc<StateStore>, audit: AuditHandle) -> Self {
        Self {
            hours,
            state,
            audit,
            last_heartbeat: Mutex::new(None),
        }
    }

    pub fn hours(&self) -> &SessionHours {
        &self.hours
    }

    /// Re-derive the session from the current clock and commit any change.
    pub fn evaluate(&self) -> Option<(Session, Session)> {
        self.evaluate_at(Local::now())
    }

    /// Returns `Some((from, to))` when a transition was committed, `None` when
    /// the stored session already matches the clock.
    pub fn evaluate_at(&self, now: DateTime<Local>) -> Option<(Session, Session)> {
        self.heartbeat(now);

        let next = self.hours.classify(now);
        let transition = self.state.mutate(|state| {
            let previous = state.session;
            if previous == next {
                return None;
            }
            state.session = next;
            state.thinking.current_market = next.to_string();
            Some((previous, next))
        });

        if let Some((from, to)) = transition {
            let msg = format!("Session transition: {} -> {}", from, to);
            logger::info(LogTag::Session, &msg);
            self.audit.log_system("INFO", "session", &msg);
            match to {
                Session::PreMarket => self.on_pre_market(),
                Session::PostMarket => self.on_post_market(),
                _ => {}
            }
        }
        transition
    }

    fn on_pre_market(&self) {
        logger::info(LogTag::Session, "Pre-market: warming up for the day");
        self.state.narrate("Pre-market open, preparing for the session");
    }

    /// End-of-day summary, written durably so the day's outcome survives the
    /// overnight state reset.
    fn on_post_market(&self) {
        let state = self.state.load();
        let summary = json!({
            "realized_pnl": state.wallet.realized_pnl,
            "daily_loss": state.daily_loss.current,
            "breached": state.daily_loss.breached,
            "open_positions": state.open_positions(),
        });
        let msg = format!(
            "Post-market summary: realized {:.2}, daily loss {:.2}, breached {}",
            state.wallet.realized_pnl, state.daily_loss.current, state.daily_loss.breached
        );
        logger::info(LogTag::Session, &msg);
        self.audit
            .log_system_payload("INFO", "session", &msg, Some(summary));
        self.state.narrate("Post-market, day is done");
    }

    /// Periodic liveness record in the audit trail.
    fn heartbeat(&self, now: DateTime<Local>) {
        let mut last = match self.last_heartbeat.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let due = match *last {
            None => true,
            Some(at) => now.signed_duration_since(at).num_seconds() >= self.hours.heartbeat.as_secs() as i64,
        };
        if due {
            *last = Some(now);
            let session = self.state.load().session;
            self.audit.log_system(
                "INFO",
                "session",
                &format!("Heartbeat: session {}", session),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::TradingConfig;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn hours() -> SessionHours {
        SessionHours::from_config(&SessionConfig::default()).unwrap()
    }

    fn monday_at(h: u32, m: u32) -> DateTime<Local> {
        // 2026-08-24 is a Monday.
        Local.with_ymd_and_hms(2026, 8, 24, h, m, 0).unwrap()
    }

    #[test]
    fn weekday_boundaries_classify_in_order() {
        let hours = hours();
        assert_eq!(hours.classify(monday_at(8, 59)), Session::MarketClosed);
        assert_eq!(hours.classify(monday_at(9, 0)), Session::PreMarket);
        assert_eq!(hours.classify(monday_at(9, 14)), Session::PreMarket);
        assert_eq!(hours.classify(monday_at(9, 15)), Session::LiveMarket);
        assert_eq!(hours.classify(monday_at(15, 29)), Session::LiveMarket);
        assert_eq!(hours.classify(monday_at(15, 30)), Session::PostMarket);
        assert_eq!(hours.classify(monday_at(15, 59)), Session::PostMarket);
        assert_eq!(hours.classify(monday_at(16, 0)), Session::MarketClosed);
    }

    #[test]
    fn weekends_are_always_closed() {
        let hours = hours();
        // 2026-08-22 is a Saturday.
        let saturday_midday = Local.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap();
        assert_eq!(hours.classify(saturday_midday), Session::MarketClosed);
        let sunday = Local.with_ymd_and_hms(2026, 8, 23, 10, 0, 0).unwrap();
        assert_eq!(hours.classify(sunday), Session::MarketClosed);
    }

    #[test]
    fn evaluate_commits_once_per_transition() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::start(dir.path().join("audit.db")).unwrap();
        let state = Arc::new(StateStore::open(
            dir.path().join("bot_state.json"),
            &TradingConfig::default(),
            audit.handle(),
        ));
        let engine = SessionEngine::new(hours(), state.clone(), audit.handle());

        let open = monday_at(10, 0);
        assert_eq!(
            engine.evaluate_at(open),
            Some((Session::MarketClosed, Session::LiveMarket))
        );
        assert_eq!(state.load().session, Session::LiveMarket);

        // Same instant again: nothing to commit.
        assert_eq!(engine.evaluate_at(open), None);

        assert_eq!(
            engine.evaluate_at(monday_at(15, 45)),
            Some((Session::LiveMarket, Session::PostMarket))
        );
    }

    #[test]
    fn post_market_writes_a_durable_summary() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::start(dir.path().join("audit.db")).unwrap();
        let state = Arc::new(StateStore::open(
            dir.path().join("bot_state.json"),
            &TradingConfig::default(),
            audit.handle(),
        ));
        state.mutate(|s| {
            s.session = Session::LiveMarket;
            s.wallet.realized_pnl = -42.5;
            s.daily_loss.current = -42.5;
        });

        let engine = SessionEngine::new(hours(), state, audit.handle());
        engine.evaluate_at(monday_at(15, 45));
        assert!(audit.flush(Duration::from_secs(5)));

        let logs = audit.query_recent(20).unwrap();
        let summary = logs
            .iter()
            .find(|r| r.message.contains("Post-market summary"))
            .expect("summary event missing");
        assert!(summary.payload.contains("-42.5"));
    }
}
