/// Audit database schema and row-level helpers.
///
/// Three independent record sets: signals (append-only), trades (insert on
/// entry, one permitted update filling the exit columns), and system logs
/// (append-only). Every record is self-contained and timestamped in ISO-8601
/// form so the tables replay in order without joins.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::AuditEvent;

const SCHEMA_SIGNALS: &str = r#"
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    symbol TEXT NOT NULL,
    signal_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    regime TEXT,
    reason TEXT,
    raw_payload TEXT
);
"#;

const SCHEMA_TRADES: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    trade_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    entry_price REAL NOT NULL,
    exit_price REAL,
    pnl REAL DEFAULT 0.0,
    status TEXT NOT NULL,
    entry_time TEXT NOT NULL,
    exit_time TEXT,
    exit_reason TEXT,
    mode TEXT NOT NULL,
    signal_ref TEXT
);
"#;

const SCHEMA_SYSTEM_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS system_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    level TEXT NOT NULL,
    module TEXT NOT NULL,
    message TEXT NOT NULL,
    payload TEXT
);
"#;

const AUDIT_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON signals(timestamp DESC);",
    "CREATE INDEX IF NOT EXISTS idx_trades_entry_time ON trades(entry_time DESC);",
    "CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status, entry_time DESC);",
    "CREATE INDEX IF NOT EXISTS idx_system_logs_level ON system_logs(level, id DESC);",
];

/// Open a connection with the standard pragma configuration.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open audit database {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to set WAL mode")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous mode")?;
    Ok(conn)
}

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for schema in [SCHEMA_SIGNALS, SCHEMA_TRADES, SCHEMA_SYSTEM_LOGS] {
        conn.execute(schema, [])
            .context("failed to create audit table")?;
    }
    for index in AUDIT_INDEXES {
        conn.execute(index, [])
            .context("failed to create audit index")?;
    }
    Ok(())
}

/// Persist one event. Trade exits are the single permitted update: they fill
/// the previously-NULL exit columns of the entry row.
pub fn insert_event(conn: &Connection, event: &AuditEvent) -> rusqlite::Result<()> {
    match event {
        AuditEvent::Signal { signal, at } => {
            let raw = serde_json::to_string(signal).unwrap_or_default();
            conn.execute(
                "INSERT INTO signals (timestamp, symbol, signal_type, confidence, regime, reason, raw_payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    at.to_rfc3339(),
                    signal.symbol,
                    signal.kind.to_string(),
                    signal.confidence,
                    signal.regime,
                    signal.reason,
                    raw,
                ],
            )?;
        }
        AuditEvent::TradeEntry(trade) => {
            conn.execute(
                "INSERT INTO trades (trade_id, symbol, direction, quantity, entry_price, status, entry_time, mode, signal_ref) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    trade.trade_id,
                    trade.symbol,
                    trade.direction.to_string(),
                    trade.quantity,
                    trade.entry_price,
                    trade.status.to_string(),
                    trade.entry_time.to_rfc3339(),
                    trade.mode.to_string(),
                    trade.signal_ref,
                ],
            )?;
        }
        AuditEvent::TradeExit {
            trade_id,
            exit_price,
            pnl,
            exit_reason,
            exit_time,
        } => {
            conn.execute(
                "UPDATE trades SET exit_price = ?1, pnl = ?2, status = 'CLOSED', exit_time = ?3, exit_reason = ?4 \
                 WHERE trade_id = ?5",
                params![
                    exit_price,
                    pnl,
                    exit_time.to_rfc3339(),
                    exit_reason.to_string(),
                    trade_id,
                ],
            )?;
        }
        AuditEvent::System {
            at,
            level,
            module,
            message,
            payload,
        } => {
            let payload = payload
                .as_ref()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "{}".to_string());
            conn.execute(
                "INSERT INTO system_logs (timestamp, level, module, message, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![at.to_rfc3339(), level, module, message, payload],
            )?;
        }
    }
    Ok(())
}

/// One row from the system_logs table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub module: String,
    pub message: String,
    pub payload: String,
}

/// One row from the trades table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub symbol: String,
    pub direction: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: f64,
    pub status: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub exit_reason: Option<String>,
    pub mode: String,
}

pub fn query_recent_system_logs(conn: &Connection, limit: usize) -> Result<Vec<SystemLogRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, timestamp, level, module, message, payload \
             FROM system_logs ORDER BY id DESC LIMIT ?1",
        )
        .context("failed to prepare system_logs query")?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(SystemLogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                module: row.get(3)?,
                message: row.get(4)?,
                payload: row.get(5)?,
            })
        })
        .context("failed to query system_logs")?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.context("failed to read system_logs row")?);
    }
    Ok(records)
}

pub fn query_recent_trades(conn: &Connection, limit: usize) -> Result<Vec<TradeRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT trade_id, symbol, direction, quantity, entry_price, exit_price, pnl, \
                    status, entry_time, exit_time, exit_reason, mode \
             FROM trades ORDER BY entry_time DESC LIMIT ?1",
        )
        .context("failed to prepare trades query")?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(TradeRecord {
                trade_id: row.get(0)?,
                symbol: row.get(1)?,
                direction: row.get(2)?,
                quantity: row.get(3)?,
                entry_price: row.get(4)?,
                exit_price: row.get(5)?,
                pnl: row.get(6)?,
                status: row.get(7)?,
                entry_time: row.get(8)?,
                exit_time: row.get(9)?,
                exit_reason: row.get(10)?,
                mode: row.get(11)?,
            })
        })
        .context("failed to query trades")?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.context("failed to read trades row")?);
    }
    Ok(records)
}
