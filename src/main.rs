use papertrader::{arguments, logger, paths, run};

#[tokio::main]
async fn main() {
    if arguments::is_help_requested() {
        arguments::print_help();
        return;
    }

    if let Err(e) = paths::ensure_all_directories() {
        eprintln!("Failed to prepare data directories: {:#}", e);
        std::process::exit(1);
    }

    logger::init();

    if let Err(e) = run::run_bot().await {
        logger::error(logger::LogTag::System, &format!("Fatal error: {:#}", e));
        logger::flush();
        std::process::exit(1);
    }
}
