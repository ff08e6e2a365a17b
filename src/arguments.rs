/// Centralized command-line argument handling.
///
/// Arguments are stored once in a thread-safe singleton so every module can
/// check flags without threading parsed options through constructors. Tests
/// and tools can override the captured arguments with `set_cmd_args`.

use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Override the captured arguments (used by tests).
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Snapshot of the current arguments.
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Check if a specific argument is present.
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Value following a flag, e.g. `--config path/to/config.json`.
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

pub fn print_help() {
    println!("papertrader - paper trading bot with a durable audit trail");
    println!();
    println!("USAGE:");
    println!("    papertrader [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>      Config file (default: config.json)");
    println!("    --data-dir <path>    Data directory (default: data)");
    println!("    --quiet              Only warnings and errors on console");
    println!("    --verbose            Show verbose trace output");
    println!("    --debug-<module>     Debug output for one module, e.g. --debug-risk");
    println!("                         (system, state, audit, session, risk,");
    println!("                          execution, signals, trader)");
    println!("    -h, --help           Show this help");
}
