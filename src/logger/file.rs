/// File mirror for console logging.
///
/// Plain-text copies of every emitted log line are appended to a log file in
/// the logs directory. Initialization is optional: before `init_file_logging`
/// runs (or if it fails), file output is silently skipped so tests and tools
/// can log to console only.

use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

static LOG_FILE: Lazy<Mutex<Option<BufWriter<File>>>> = Lazy::new(|| Mutex::new(None));

/// Open (or create) the log file for appending.
pub fn init_file_logging() {
    let path = crate::paths::log_file_path();

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            if let Ok(mut guard) = LOG_FILE.lock() {
                *guard = Some(BufWriter::new(file));
            }
        }
        Err(e) => {
            eprintln!("Logger: failed to open {}: {}", path.display(), e);
        }
    }
}

/// Append one line to the log file, if file logging is active.
pub fn write_to_file(line: &str) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(writer) = guard.as_mut() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

/// Flush pending writes to disk. Called during shutdown.
pub fn flush_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(writer) = guard.as_mut() {
            let _ = writer.flush();
        }
    }
}
