//! Paper trading bot with shared state and a durable audit trail.
//!
//! The moving parts, in dependency order:
//!
//! - [`state`]: the single source of truth, persisted as a JSON snapshot.
//! - [`audit`]: append-only SQLite record of signals, trades, and system
//!   events, written by a background thread.
//! - [`session`]: clock-driven market session state machine.
//! - [`execution`]: the only gateway for opening positions.
//! - [`risk`]: the only gateway for closing them.
//! - [`signals`]: signal sources, including the built-in simulated market.
//! - [`trader`]: the loop that ties it all together.

pub mod arguments;
pub mod audit;
pub mod config;
pub mod execution;
pub mod logger;
pub mod paths;
pub mod risk;
pub mod run;
pub mod session;
pub mod shutdown;
pub mod signals;
pub mod state;
pub mod trader;
pub mod types;
