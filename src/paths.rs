/// Filesystem layout for runtime data.
///
/// Everything lives under one data directory (default `data`, overridable
/// with `--data-dir`): the state snapshot, the audit database, and the log
/// files. The config file defaults to the working directory so it survives a
/// data-dir wipe.

use crate::arguments::get_arg_value;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::fs;
use std::path::PathBuf;

static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    PathBuf::from(get_arg_value("--data-dir").unwrap_or_else(|| "data".to_string()))
});

pub fn data_dir() -> PathBuf {
    DATA_DIR.clone()
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("papertrader.log")
}

pub fn state_file_path() -> PathBuf {
    data_dir().join("bot_state.json")
}

pub fn audit_db_path() -> PathBuf {
    data_dir().join("audit.db")
}

pub fn config_path() -> PathBuf {
    PathBuf::from(get_arg_value("--config").unwrap_or_else(|| "config.json".to_string()))
}

/// Create every directory the process writes into. Must run before logger
/// initialization, which opens a file in the logs directory.
pub fn ensure_all_directories() -> Result<()> {
    for dir in [data_dir(), logs_dir()] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(())
}
