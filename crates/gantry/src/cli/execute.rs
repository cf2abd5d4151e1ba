//! Command execution logic.
//!
//! Each function wires an [`App`] into the engine components and renders
//! the result through the output module. Errors bubble up as `anyhow`
//! errors at this boundary; inside the library they stay typed.

use super::args::{
    AnalyzeArgs, ChainArgs, ExplainArgs, HealOrderArgs, ImpactArgs, InitArgs, ListArgs, PhaseArgs,
    PhaseAction, RegisterArgs, ShowArgs, StatsArgs,
};
use crate::app::App;
use crate::catalog::ResourceCatalog;
use crate::commands::init;
use crate::domain::{DriftFinding, ResourceFilter, ResourceId, ResourceInfo, ResourceState};
use crate::error::Error;
use crate::heal::AutoHealEngine;
use crate::output::{self, OutputMode};
use crate::phase::{BookkeepingDeleter, PhaseDeletionManager};
use crate::populate::GraphPopulator;
use crate::query::GraphQuery;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// A JSON payload that is either one value or an array of values.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    /// An array of values.
    Many(Vec<T>),
    /// A single value.
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

async fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Execute the `init` command.
pub async fn execute_init(args: &InitArgs) -> Result<()> {
    let result = init::init(&std::env::current_dir()?).await?;
    if !args.quiet {
        println!("Initialized gantry project in {}", result.gantry_dir.display());
        println!("  config:  {}", result.config_file.display());
        println!("  catalog: {}", result.catalog_file.display());
    }
    Ok(())
}

/// Execute the `register` command.
pub async fn execute_register(app: &mut App, args: &RegisterArgs, mode: OutputMode) -> Result<()> {
    let observations: OneOrMany<ResourceInfo> = read_json_file(&args.file).await?;
    let populator = GraphPopulator::default();
    let graph = app.graph();

    for info in observations.into_vec() {
        let report = populator
            .register_resource(&graph, app.catalog_mut(), info)
            .await?;
        output::print_registration(&report, mode);
    }

    app.save().await?;
    Ok(())
}

/// Execute the `list` command.
pub async fn execute_list(app: &App, args: &ListArgs, mode: OutputMode) -> Result<()> {
    let filter = ResourceFilter {
        state: args.state.map(Into::into),
        phase: args.phase.clone(),
        resource_type: args.resource_type.clone(),
        limit: Some(args.limit),
    };
    let records = app.catalog().list(&filter).await?;
    output::print_records(&records, mode);
    Ok(())
}

/// Execute the `show` command.
pub async fn execute_show(app: &App, args: &ShowArgs, mode: OutputMode) -> Result<()> {
    let id = ResourceId::new(args.resource_id.clone());
    let record = app
        .catalog()
        .get(&id)
        .await?
        .ok_or_else(|| Error::ResourceNotFound(id.clone()))?;

    let dependencies = app.catalog().dependencies(&id).await?;
    let dependents = app.catalog().dependents(&id).await?;
    output::print_record_detail(&record, &dependencies, &dependents, mode);
    Ok(())
}

/// Execute the `impact` command.
pub async fn execute_impact(app: &App, args: &ImpactArgs, mode: OutputMode) -> Result<()> {
    let query = GraphQuery::new(app.graph());
    let report = query
        .get_impacted_resources(&ResourceId::new(args.resource_id.clone()))
        .await?;
    output::print_impact(&report, mode);
    Ok(())
}

/// Execute the `chain` command.
pub async fn execute_chain(app: &App, args: &ChainArgs, mode: OutputMode) -> Result<()> {
    let query = GraphQuery::new(app.graph());
    let chains = query
        .get_dependency_chain(&ResourceId::new(args.resource_id.clone()))
        .await?;
    output::print_chains(&chains, mode);
    Ok(())
}

/// Execute the `explain` command.
pub async fn execute_explain(app: &App, args: &ExplainArgs, mode: OutputMode) -> Result<()> {
    let query = GraphQuery::new(app.graph());
    let explanation = query
        .explain_dependency(
            &ResourceId::new(args.from.clone()),
            &ResourceId::new(args.to.clone()),
        )
        .await?;
    output::print_explanation(&explanation, mode);
    Ok(())
}

/// Execute the `heal-order` command.
pub async fn execute_heal_order(app: &App, args: &HealOrderArgs, mode: OutputMode) -> Result<()> {
    let order = if args.resource_ids.is_empty() {
        // No explicit targets: order everything currently drifted.
        let graph = app.graph();
        let graph = graph.read().await;
        graph.get_healing_order(None)
    } else {
        let ids: Vec<ResourceId> = args
            .resource_ids
            .iter()
            .map(|id| ResourceId::new(id.clone()))
            .collect();
        let query = GraphQuery::new(app.graph());
        query.get_healing_order(&ids).await?
    };
    output::print_healing_order(&order, mode);
    Ok(())
}

/// Execute the `analyze` command.
///
/// Classifies the findings, marks the affected resources drifted in both
/// the graph and the catalog, and renders the safe/risky split. Actual
/// remediation runs wherever the host has registered heal handlers.
pub async fn execute_analyze(app: &mut App, args: &AnalyzeArgs, mode: OutputMode) -> Result<()> {
    let findings: OneOrMany<DriftFinding> = read_json_file(&args.file).await?;
    let engine = AutoHealEngine::new(app.policy().clone());
    let graph = app.graph();

    let analysis = engine.analyze_drift(&graph, findings.into_vec()).await;

    // Persist the drift transition so it survives this process.
    for finding in analysis.safe_drifts.iter().chain(&analysis.risky_drifts) {
        match app
            .catalog_mut()
            .update_state(&finding.resource_id, ResourceState::Drift, None)
            .await
        {
            Ok(_) | Err(Error::ResourceNotFound(_)) => {}
            Err(error) => return Err(error.into()),
        }
    }
    app.save().await?;

    output::print_analysis(&analysis, mode);
    Ok(())
}

/// Execute the `phase` command.
pub async fn execute_phase(app: &mut App, args: &PhaseArgs, mode: OutputMode) -> Result<()> {
    let manager = PhaseDeletionManager::new(app.graph());

    match &args.action {
        PhaseAction::Info { phase } => {
            let info = manager.get_phase_info(app.catalog(), phase).await?;
            output::print_phase_info(&info, mode);
        }
        PhaseAction::Delete {
            phase,
            force,
            yes,
            timeout_secs,
        } => {
            if !*yes {
                // Confirmation step: render what would happen and stop.
                let info = manager.get_phase_info(app.catalog(), phase).await?;
                output::print_phase_info(&info, mode);
                println!("\nRe-run with --yes to delete this phase");
                return Ok(());
            }

            let timeout = timeout_secs.map(Duration::from_secs);
            let outcome = manager
                .delete_phase(app.catalog_mut(), &BookkeepingDeleter, phase, *force, timeout)
                .await?;
            app.save().await?;
            output::print_deletion_outcome(&outcome, mode);
        }
    }
    Ok(())
}

/// Execute the `stats` command.
pub async fn execute_stats(app: &App, _args: &StatsArgs, mode: OutputMode) -> Result<()> {
    let graph = app.graph();
    let graph = graph.read().await;
    let stats = graph.get_graph_stats();
    output::print_stats(&stats, mode);
    Ok(())
}
