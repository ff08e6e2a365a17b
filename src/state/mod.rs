//! Shared trading state: the process-wide single source of truth.

mod store;
mod types;

pub use store::StateStore;
pub use types::{BotThinking, DailyLoss, KillSwitch, TradingState, Wallet, NARRATIVE_CAPACITY};
