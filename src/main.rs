//! Strata entry point.
//!
//! Exit contract: 0 when the pass converged, 1 when any node terminal-failed
//! (or planning/manifest loading failed), 2 when a readiness wait timed out.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strata::cli::{Cli, Commands};
use strata::commands;
use strata_reconciler::ApplyReport;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Validate { manifest } => {
            commands::validate(&manifest)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { manifest, state } => {
            commands::show_plan(&manifest, &state)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Apply {
            manifest,
            state,
            max_in_flight,
        } => {
            let report = commands::apply(&manifest, &state, max_in_flight).await?;
            Ok(exit_code_for(&report))
        }
        Commands::Destroy { manifest, state } => {
            let report = commands::destroy(&manifest, &state).await?;
            Ok(exit_code_for(&report))
        }
    }
}

fn exit_code_for(report: &ApplyReport) -> ExitCode {
    if report.converged() {
        ExitCode::SUCCESS
    } else if report.timed_out() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
