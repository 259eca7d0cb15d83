//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use strata_graph::{ApplyPlan, Operation, PriorState, ResourceGraph, plan};
use strata_reconciler::{ApplyReport, Coordinator, StateStore};

use crate::config::Manifest;
use crate::{sim, state_file};

fn build_graph(manifest: &Manifest) -> Result<ResourceGraph> {
    let nodes = manifest.resource_nodes().context("invalid manifest")?;
    ResourceGraph::from_nodes(nodes).context("invalid resource graph")
}

/// `strata validate`: graph construction plus a dry plan against empty state.
pub fn validate(manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load manifest '{}'", manifest_path.display()))?;
    let graph = build_graph(&manifest)?;
    let computed = plan(&graph, &PriorState::new()).context("plan failed")?;

    println!(
        "manifest ok: {} nodes, {} edges ({} infrastructure, {} application)",
        graph.node_count(),
        graph.edge_count(),
        computed.infrastructure.len(),
        computed.application.len(),
    );
    Ok(())
}

/// `strata plan`: show per-node operations without running them.
pub fn show_plan(manifest_path: &Path, state_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load manifest '{}'", manifest_path.display()))?;
    let graph = build_graph(&manifest)?;
    let snapshot = state_file::load(state_path).context("failed to load state")?;
    let computed = plan(&graph, &snapshot.prior_state()).context("plan failed")?;

    print_plan(&computed);
    Ok(())
}

/// `strata apply`: converge the declared topology, then persist state.
pub async fn apply(
    manifest_path: &Path,
    state_path: &Path,
    max_in_flight: Option<usize>,
) -> Result<ApplyReport> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load manifest '{}'", manifest_path.display()))?;
    let graph = build_graph(&manifest)?;
    let snapshot = state_file::load(state_path).context("failed to load state")?;
    let state = Arc::new(StateStore::from_snapshot(snapshot));

    let mut config = manifest.settings.coordinator_config();
    if let Some(cap) = max_in_flight {
        config.max_in_flight = cap;
    }

    let coordinator = Coordinator::new(sim::simulated_backends(), Arc::clone(&state), config);
    spawn_ctrl_c_abort(&coordinator);

    let report = coordinator.apply(&graph).await.context("apply failed")?;
    state_file::save(state_path, &state.snapshot()).context("failed to save state")?;
    print_report("apply", &report);
    Ok(report)
}

/// `strata destroy`: tear the tracked topology down, then persist state.
pub async fn destroy(manifest_path: &Path, state_path: &Path) -> Result<ApplyReport> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load manifest '{}'", manifest_path.display()))?;
    let graph = build_graph(&manifest)?;
    let snapshot = state_file::load(state_path).context("failed to load state")?;
    let state = Arc::new(StateStore::from_snapshot(snapshot));

    let coordinator = Coordinator::new(
        sim::simulated_backends(),
        Arc::clone(&state),
        manifest.settings.coordinator_config(),
    );
    spawn_ctrl_c_abort(&coordinator);

    let report = coordinator.destroy(&graph).await.context("destroy failed")?;
    state_file::save(state_path, &state.snapshot()).context("failed to save state")?;
    print_report("destroy", &report);
    Ok(report)
}

/// First Ctrl-C aborts gracefully: running nodes finish, nothing new starts.
fn spawn_ctrl_c_abort(coordinator: &Coordinator) {
    let abort = coordinator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight nodes, launching nothing new");
            abort.abort();
        }
    });
}

fn print_plan(plan: &ApplyPlan) {
    for (stage, bucket) in [
        ("infrastructure", &plan.infrastructure),
        ("application", &plan.application),
    ] {
        println!("{stage}:");
        for entry in bucket {
            let op = match entry.operation {
                Operation::Create => "+ create",
                Operation::Update => "~ update",
                Operation::Noop => "  keep  ",
                Operation::Destroy => "- destroy",
            };
            println!("  {op} {}", entry.id);
        }
    }
    println!("{} operations pending", plan.pending());
}

fn print_report(verb: &str, report: &ApplyReport) {
    info!(
        succeeded = report.succeeded.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        aborted = report.aborted.len(),
        "{verb} finished"
    );
    for (node, error) in &report.failed {
        println!("failed   {node}: {error}");
    }
    for (node, root) in &report.skipped {
        println!("skipped  {node} (blocked by {root})");
    }
    for node in &report.aborted {
        println!("aborted  {node}");
    }
    if report.converged() {
        println!(
            "{verb} converged: {} changed, {} unchanged",
            report.succeeded.len(),
            report.unchanged.len()
        );
    } else {
        println!("{verb} did not converge");
    }
}
