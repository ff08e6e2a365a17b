//! Process assembly: construct every component, run the loop, tear down.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::execution::ExecutionGate;
use crate::logger::{self, LogTag};
use crate::paths;
use crate::risk::RiskManager;
use crate::session::{SessionEngine, SessionHours};
use crate::shutdown::{install_shutdown_handlers, SHUTDOWN};
use crate::signals::SimulatedMarket;
use crate::state::StateStore;
use crate::trader::TradingLoop;

pub async fn run_bot() -> Result<()> {
    let config = Config::load_or_default(&paths::config_path())?;
    let hours = SessionHours::from_config(&config.session)
        .context("invalid session hours in config")?;
    let mandatory_exit = config
        .trading
        .mandatory_exit()
        .context("invalid mandatory exit time in config")?;

    let audit = AuditLog::start(paths::audit_db_path())?;
    audit.log_system("INFO", "system", "Paper trader starting up");

    let state = Arc::new(StateStore::open(
        paths::state_file_path(),
        &config.trading,
        audit.handle(),
    ));
    state.think(|thinking| thinking.current_state = "BOOTING".to_string());

    let session = SessionEngine::new(hours, state.clone(), audit.handle());
    let risk = RiskManager::new(
        &config.trading,
        mandatory_exit,
        state.clone(),
        audit.handle(),
    );
    let gate = ExecutionGate::new(&config.trading, state.clone(), audit.handle());
    let source = Arc::new(SimulatedMarket::new(
        config.symbols.clone(),
        state.clone(),
        audit.handle(),
    ));

    install_shutdown_handlers()?;

    let trading_loop = TradingLoop::new(
        &config.general,
        state.clone(),
        audit.handle(),
        session,
        risk,
        gate,
        source,
    );
    let loop_handle = tokio::spawn(trading_loop.run());

    logger::info(LogTag::System, "Paper trader running, Ctrl+C to stop");
    SHUTDOWN.wait().await;

    loop_handle
        .await
        .context("trading loop task panicked")?;

    state.think(|thinking| thinking.current_state = "STOPPED".to_string());
    audit.log_system("INFO", "system", "Paper trader shut down cleanly");
    audit.shutdown(Duration::from_secs(config.general.audit_drain_grace_secs));
    logger::flush();

    Ok(())
}
