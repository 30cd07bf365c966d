#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use depot_sdk::ApiError;

use crate::commands::{Command, LoginHint};
use crate::config::CliConfig;

/// Exit status when the session could not be refreshed and the user has to
/// log in again. Distinct from clap's usage-error status (2).
const EXIT_SESSION_EXPIRED: u8 = 3;

/// Depot console command-line client
#[derive(Parser)]
#[command(name = "depot-cli")]
#[command(about = "Depot console command-line client")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API base URL override (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_session_expired) => {
            tracing::debug!(error = %e, "command failed after the session ended");
            ExitCode::from(EXIT_SESSION_EXPIRED)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (DEPOT__*) -> 4) CLI overrides
    let mut config = CliConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.base_url.as_deref());

    logging::init_logging(&config.logging, cli.verbose);

    cli.command.run(&config, Arc::new(LoginHint::default())).await
}
