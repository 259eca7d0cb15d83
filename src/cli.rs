//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strata - two-stage convergent infrastructure orchestrator
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Converge a declared resource topology in two stages")]
#[command(
    long_about = "Strata loads a TOML manifest of typed resource nodes, plans the \
per-node operations against tracked state, and converges them: infrastructure \
first, then the workloads whose backends are configured from infrastructure \
outputs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the manifest: graph construction, cycles, stage references
    Validate {
        /// Manifest file path
        #[arg(short, long, default_value = "strata.toml")]
        manifest: PathBuf,
    },

    /// Show the operations an apply would run, without running them
    Plan {
        /// Manifest file path
        #[arg(short, long, default_value = "strata.toml")]
        manifest: PathBuf,

        /// Tracked-state file path
        #[arg(short, long, default_value = "strata.state.json")]
        state: PathBuf,
    },

    /// Converge the declared topology
    Apply {
        /// Manifest file path
        #[arg(short, long, default_value = "strata.toml")]
        manifest: PathBuf,

        /// Tracked-state file path
        #[arg(short, long, default_value = "strata.state.json")]
        state: PathBuf,

        /// Override the concurrency cap from [settings]
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Tear the tracked topology down, workloads first
    Destroy {
        /// Manifest file path
        #[arg(short, long, default_value = "strata.toml")]
        manifest: PathBuf,

        /// Tracked-state file path
        #[arg(short, long, default_value = "strata.state.json")]
        state: PathBuf,
    },
}
