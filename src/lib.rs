//! Strata CLI front-end: manifest loading, tracked-state persistence and the
//! subcommand implementations, over the `strata-graph`/`strata-reconciler`
//! core.

pub mod cli;
pub mod commands;
pub mod config;
pub mod sim;
pub mod state_file;
