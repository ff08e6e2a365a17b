//! Structured logging for the paper trader
//!
//! Provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via --debug-<module> flags
//! - Dual output: colored console + plain-text file mirror
//!
//! ## Usage
//!
//! ```ignore
//! use papertrader::logger::{self, LogTag};
//!
//! logger::error(LogTag::Audit, "Write failed");
//! logger::info(LogTag::Trader, "Position opened");
//! logger::debug(LogTag::State, "Snapshot persisted"); // Only with --debug-state
//! ```
//!
//! Call `logger::init()` once at startup, after the data directories exist.

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system: parse CLI debug flags, open the log file.
pub fn init() {
    config::init_from_args();
    file::init_file_logging();
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level. Only shown when the matching --debug-<module> flag is
/// present.
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level. Only shown with --verbose or --verbose-<module>.
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush pending file writes. Call during shutdown.
pub fn flush() {
    file::flush_file_logging();
}
