//! Run a single sync from the command line and print its summary.

use chrono::NaiveDate;
use clap::Parser;
use ledger_sync_service::config::LedgerSyncConfig;
use ledger_sync_service::services::init_metrics;
use ledger_sync_service::startup::AppState;
use service_core::observability::init_tracing;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ledger-sync-once", version, about = "Run one ledger sync and exit")]
struct Cli {
    /// Rebuild the store instead of syncing incrementally.
    #[arg(long)]
    reload: bool,

    /// First day to rebuild (YYYY-MM-DD). Defaults to the stored reload date.
    #[arg(long, requires = "reload")]
    from: Option<NaiveDate>,
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = LedgerSyncConfig::from_env()?;
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    let state = AppState::connect(&config, true).await?;

    let outcome = if cli.reload {
        tracing::info!(reload_from = ?cli.from, "Reload requested");
        state.orchestrator.run_reload(cli.from).await?
    } else {
        state.orchestrator.run_once().await?
    };
    Ok(outcome.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Sync failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
