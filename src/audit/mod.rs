//! Append-only durable audit trail.
//!
//! Producers hand events to an unbounded in-process queue and return
//! immediately; a single background writer drains the queue in order into
//! SQLite. Reads (`query_recent`, `recent_trades`) go straight to the
//! database on their own connection, independent of the queue, so a backlog
//! only delays visibility and never causes an error.

mod db;
mod worker;

pub use db::{SystemLogRecord, TradeRecord};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::logger::{self, LogTag};
use crate::types::{ExitReason, Signal, Trade};
use worker::Job;

/// One durable audit record.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    Signal {
        signal: Signal,
        at: DateTime<Utc>,
    },
    TradeEntry(Trade),
    TradeExit {
        trade_id: String,
        exit_price: f64,
        pnl: f64,
        exit_reason: ExitReason,
        exit_time: DateTime<Utc>,
    },
    System {
        at: DateTime<Utc>,
        level: String,
        module: String,
        message: String,
        payload: Option<serde_json::Value>,
    },
}

/// Cloneable producer side of the audit log. Cheap to hand to every
/// component; `append` never blocks on storage.
#[derive(Clone)]
pub struct AuditHandle {
    tx: UnboundedSender<Job>,
}

impl AuditHandle {
    /// Enqueue an event for the background writer. Non-blocking; events sent
    /// after shutdown are dropped with a debug log.
    pub fn append(&self, event: AuditEvent) {
        if self.tx.send(Job::Event(event)).is_err() {
            logger::debug(LogTag::Audit, "Audit queue closed, event dropped");
        }
    }

    pub fn log_system(&self, level: &str, module: &str, message: &str) {
        self.log_system_payload(level, module, message, None);
    }

    pub fn log_system_payload(
        &self,
        level: &str,
        module: &str,
        message: &str,
        payload: Option<serde_json::Value>,
    ) {
        self.append(AuditEvent::System {
            at: Utc::now(),
            level: level.to_string(),
            module: module.to_string(),
            message: message.to_string(),
            payload,
        });
    }

    /// Record a signal evaluation plus a human-readable companion line.
    pub fn log_signal(&self, signal: &Signal) {
        self.log_system(
            "INFO",
            "signals",
            &format!(
                "Signal engine sees a {} setup for {} at {:.2}: {}",
                signal.kind, signal.symbol, signal.price, signal.reason
            ),
        );
        self.append(AuditEvent::Signal {
            signal: signal.clone(),
            at: Utc::now(),
        });
    }

    pub fn log_trade_entry(&self, trade: &Trade) {
        self.log_system(
            "INFO",
            "execution",
            &format!(
                "Committed a {} paper position for {} at {:.2}, quantity {}",
                trade.direction, trade.symbol, trade.entry_price, trade.quantity
            ),
        );
        self.append(AuditEvent::TradeEntry(trade.clone()));
    }

    /// Record the terminal fields of a closed trade. Reads the exit columns
    /// off the trade itself; an open trade is a caller bug and is skipped.
    pub fn log_trade_exit(&self, trade: &Trade) {
        let (Some(exit_price), Some(pnl), Some(exit_reason), Some(exit_time)) =
            (trade.exit_price, trade.pnl, trade.exit_reason, trade.exit_time)
        else {
            logger::warning(
                LogTag::Audit,
                &format!("Exit record for {} missing terminal fields", trade.trade_id),
            );
            return;
        };
        self.append(AuditEvent::TradeExit {
            trade_id: trade.trade_id.clone(),
            exit_price,
            pnl,
            exit_reason,
            exit_time,
        });
    }
}

/// The audit log itself: owns the database path and the writer thread.
pub struct AuditLog {
    handle: AuditHandle,
    db_path: PathBuf,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLog {
    /// Initialize the schema and start the background writer.
    pub fn start(db_path: impl Into<PathBuf>) -> Result<std::sync::Arc<Self>> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create audit directory {}", parent.display())
                })?;
            }
        }

        let conn = db::open_connection(&db_path)?;
        db::initialize_schema(&conn)?;
        drop(conn);

        let (tx, rx) = unbounded_channel();
        let worker = worker::spawn(db_path.clone(), rx)
            .context("failed to spawn audit writer thread")?;

        logger::info(
            LogTag::Audit,
            &format!("Audit log ready at {}", db_path.display()),
        );

        Ok(std::sync::Arc::new(Self {
            handle: AuditHandle { tx },
            db_path,
            worker: Mutex::new(Some(worker)),
        }))
    }

    pub fn handle(&self) -> AuditHandle {
        self.handle.clone()
    }

    pub fn append(&self, event: AuditEvent) {
        self.handle.append(event);
    }

    pub fn log_system(&self, level: &str, module: &str, message: &str) {
        self.handle.log_system(level, module, message);
    }

    /// Most recent system log records, newest first. Synchronous read on its
    /// own connection; events still sitting in the queue are simply not
    /// visible yet.
    pub fn query_recent(&self, limit: usize) -> Result<Vec<SystemLogRecord>> {
        let conn = db::open_connection(&self.db_path)?;
        db::query_recent_system_logs(&conn, limit)
    }

    /// Most recent trade records, newest first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let conn = db::open_connection(&self.db_path)?;
        db::query_recent_trades(&conn, limit)
    }

    /// Wait until everything enqueued so far has been persisted. Returns
    /// false if the writer did not confirm within the timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        if self.handle.tx.send(Job::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Drain remaining events within the grace period, then stop the writer.
    /// Best-effort: events still unflushed after the grace period are lost.
    pub fn shutdown(&self, grace: Duration) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(mut poisoned) => poisoned.get_mut().take(),
        };
        let Some(worker) = worker else {
            return;
        };

        let (ack_tx, ack_rx) = std_mpsc::channel();
        if self.handle.tx.send(Job::Shutdown(ack_tx)).is_ok() {
            match ack_rx.recv_timeout(grace) {
                Ok(()) => {
                    let _ = worker.join();
                    logger::info(LogTag::Audit, "Audit log drained and stopped");
                }
                Err(_) => {
                    logger::warning(
                        LogTag::Audit,
                        "Audit writer did not drain within the grace period",
                    );
                }
            }
        }
    }
}
