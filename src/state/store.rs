use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::types::{BotThinking, TradingState};
use crate::audit::AuditHandle;
use crate::config::TradingConfig;
use crate::logger::{self, LogTag};

/// Single source of truth for trading state, file-backed.
///
/// The in-memory copy is authoritative; the JSON snapshot on disk is a
/// best-effort mirror rewritten whole after every mutation. All mutations go
/// through `mutate`, which holds the write lock for the closure and the
/// persist, so no reader ever observes a half-applied state. Constructed once
/// at startup and shared by reference; there is no global instance.
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<TradingState>,
    audit: AuditHandle,
}

impl StateStore {
    /// Open the snapshot at `path`, or fall back to defaults.
    ///
    /// Missing file: start fresh. Corrupt file: keep a `.corrupt` copy for
    /// inspection, start fresh, and record an ERROR system event. Snapshot
    /// from a previous calendar day: reset to defaults for today. This
    /// startup check is the only daily-reset mechanism.
    pub fn open(path: impl Into<PathBuf>, trading: &TradingConfig, audit: AuditHandle) -> Self {
        let path = path.into();
        let today = Local::now().date_naive();

        let state = match read_snapshot(&path) {
            Ok(Some(state)) if state.date == today => {
                logger::info(
                    LogTag::State,
                    &format!("Restored state snapshot for {}", state.date),
                );
                state
            }
            Ok(Some(state)) => {
                let msg = format!("Day rollover: resetting state from {} to {}", state.date, today);
                logger::info(LogTag::State, &msg);
                audit.log_system("INFO", "state", &msg);
                TradingState::defaults(today, trading)
            }
            Ok(None) => {
                logger::info(LogTag::State, "No state snapshot found, starting fresh");
                TradingState::defaults(today, trading)
            }
            Err(e) => {
                let msg = format!("State snapshot unreadable, falling back to defaults: {:#}", e);
                logger::error(LogTag::State, &msg);
                audit.log_system("ERROR", "state", &msg);
                let backup = path.with_extension("json.corrupt");
                let _ = fs::rename(&path, &backup);
                TradingState::defaults(today, trading)
            }
        };

        let store = Self {
            path,
            inner: RwLock::new(state),
            audit,
        };
        store.mutate(|_| {});
        store
    }

    /// Clone of the current state. Readers may overlap with each other but
    /// never with an in-progress mutation.
    pub fn load(&self) -> TradingState {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a transformation as one atomic unit relative to other mutators,
    /// then persist the whole snapshot. A failed write is logged and the
    /// in-memory state stays authoritative; the next mutation retries.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut TradingState) -> R) -> R {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = f(&mut guard);

        if let Err(e) = write_snapshot(&self.path, &guard) {
            let msg = format!("State snapshot write failed: {:#}", e);
            logger::error(LogTag::State, &msg);
            self.audit.log_system("ERROR", "state", &msg);
        }

        result
    }

    /// Update the diagnostic trace only.
    pub fn think(&self, f: impl FnOnce(&mut BotThinking)) {
        self.mutate(|state| f(&mut state.thinking));
    }

    /// Push one narrative line into the bounded trace buffer.
    pub fn narrate(&self, message: &str) {
        self.mutate(|state| state.thinking.narrate(message));
    }
}

fn read_snapshot(path: &Path) -> Result<Option<TradingState>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let state = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(state))
}

/// Write the snapshot to a temp file and rename it into place, so a crash
/// mid-write never leaves a torn snapshot behind.
fn write_snapshot(path: &Path, state: &TradingState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
