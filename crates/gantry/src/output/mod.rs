//! Output rendering for CLI results.
//!
//! Every command renders either human-readable text (with colored state
//! badges and wrapped paragraphs) or pretty JSON for programmatic use,
//! selected by the global `--json` flag.

use crate::domain::{Edge, ResourceRecord, ResourceState};
use crate::graph::{GraphStats, HealingOrder};
use crate::heal::{DriftAnalysis, HealReport};
use crate::phase::{PhaseDeletionOutcome, PhaseInfo};
use crate::populate::RegistrationReport;
use crate::query::{DependencyExplanation, ImpactReport};
use colored::Colorize;
use serde::Serialize;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text.
    Text,

    /// Pretty-printed JSON.
    Json,
}

/// Render any serializable value as pretty JSON.
fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(error) => eprintln!("failed to render JSON output: {error}"),
    }
}

/// Terminal width, defaulting to 80 columns when unavailable.
fn text_width() -> usize {
    terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(80)
}

/// Wrap a paragraph to the terminal width with a hanging indent.
fn wrap_paragraph(text: &str, indent: &str) -> String {
    let options = textwrap::Options::new(text_width().saturating_sub(indent.len()).max(20))
        .initial_indent(indent)
        .subsequent_indent(indent);
    textwrap::fill(text, options)
}

/// Colored one-word badge for a lifecycle state.
fn state_badge(state: ResourceState) -> colored::ColoredString {
    match state {
        ResourceState::Healthy => "healthy".green(),
        ResourceState::Drift => "drift".yellow().bold(),
        ResourceState::Deleted => "deleted".red(),
        ResourceState::Unknown => "unknown".dimmed(),
    }
}

/// Render a resource listing.
pub fn print_records(records: &[ResourceRecord], mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(&records);
        return;
    }

    if records.is_empty() {
        println!("No resources found");
        return;
    }

    for record in records {
        let phase = record.phase.as_deref().unwrap_or("-");
        println!(
            "{:<28} {:<10} {:<24} {}",
            record.id.to_string().bold(),
            state_badge(record.state),
            record.resource_type,
            phase.dimmed()
        );
    }
    println!("\n{} resource(s)", records.len());
}

/// Render one resource with its relationships.
pub fn print_record_detail(
    record: &ResourceRecord,
    dependencies: &[Edge],
    dependents: &[Edge],
    mode: OutputMode,
) {
    if mode == OutputMode::Json {
        #[derive(Serialize)]
        struct Detail<'a> {
            record: &'a ResourceRecord,
            dependencies: &'a [Edge],
            dependents: &'a [Edge],
        }
        print_json(&Detail {
            record,
            dependencies,
            dependents,
        });
        return;
    }

    println!("{}  [{}]", record.id.to_string().bold(), state_badge(record.state));
    println!("  type:  {}", record.resource_type);
    if let Some(phase) = &record.phase {
        println!("  phase: {phase}");
    }
    println!("  first seen: {}", record.first_seen.to_rfc3339());
    println!("  last seen:  {}", record.last_seen.to_rfc3339());
    if let Some(expires_at) = &record.expires_at {
        println!("  expires:    {}", expires_at.to_rfc3339());
    }

    if !record.metadata.is_empty() {
        println!("  metadata:");
        for (key, value) in &record.metadata {
            println!("    {key}: {value}");
        }
    }

    if !dependencies.is_empty() {
        println!("  depends on:");
        for edge in dependencies {
            println!(
                "    -> {} ({}, confidence {:.2})",
                edge.target_id, edge.relationship_type, edge.confidence
            );
        }
    }
    if !dependents.is_empty() {
        println!("  depended on by:");
        for edge in dependents {
            println!(
                "    <- {} ({}, confidence {:.2})",
                edge.source_id, edge.relationship_type, edge.confidence
            );
        }
    }
}

/// Render a registration report.
pub fn print_registration(report: &RegistrationReport, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(report);
        return;
    }

    let status = if report.fully_applied() {
        "registered".green()
    } else {
        "partially registered".yellow()
    };
    println!("{} {status}", report.resource_id.to_string().bold());
    for edge in &report.edges_applied {
        println!(
            "  + {} -> {} ({})",
            edge.source_id, edge.target_id, edge.relationship_type
        );
    }
    for (edge, error) in &report.edges_failed {
        println!(
            "  {} {} -> {} ({}): {error}",
            "!".red(),
            edge.source_id,
            edge.target_id,
            edge.relationship_type
        );
    }
}

/// Render a blast-radius report.
pub fn print_impact(report: &ImpactReport, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(report);
        return;
    }

    println!("Impact of {}:", report.resource_id.to_string().bold());
    if report.transitive_dependents.is_empty() {
        println!("  no dependents, blast radius is empty");
        return;
    }

    println!("  direct dependents:");
    for id in &report.direct_dependents {
        println!("    {id}");
    }
    println!("  transitive blast radius ({}):", report.transitive_dependents.len());
    for id in &report.transitive_dependents {
        let marker = if report.direct_dependents.contains(id) {
            "*"
        } else {
            " "
        };
        println!("    {marker} {id}");
    }
}

/// Render dependency chains.
pub fn print_chains(chains: &[Vec<crate::domain::ResourceId>], mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(&chains);
        return;
    }

    if chains.is_empty() {
        println!("No dependency chains (terminal resource)");
        return;
    }

    for chain in chains {
        let rendered: Vec<String> = chain.iter().map(ToString::to_string).collect();
        println!("{}", rendered.join(" -> "));
    }
}

/// Render a healing order.
pub fn print_healing_order(order: &HealingOrder, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(order);
        return;
    }

    if order.order.is_empty() {
        println!("Nothing to heal");
        return;
    }

    println!("Healing order:");
    for (index, id) in order.order.iter().enumerate() {
        println!("  {}. {id}", index + 1);
    }
    for warning in &order.warnings {
        println!(
            "{} broke cycle {} -> {} ({}, confidence {:.2})",
            "warning:".yellow(),
            warning.source,
            warning.target,
            warning.relationship_type,
            warning.confidence
        );
    }
}

/// Render a dependency explanation.
pub fn print_explanation(explanation: &DependencyExplanation, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(explanation);
        return;
    }

    if !explanation.exists {
        println!("{}", wrap_paragraph(&explanation.explanation, ""));
        return;
    }

    let rendered: Vec<String> = explanation.path.iter().map(ToString::to_string).collect();
    println!("{}", rendered.join(" -> ").bold());
    println!("{}", wrap_paragraph(&explanation.explanation, "  "));
}

/// Render a drift analysis.
pub fn print_analysis(analysis: &DriftAnalysis, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(analysis);
        return;
    }

    println!(
        "{} safe, {} require approval",
        analysis.safe_drifts.len().to_string().green(),
        analysis.risky_drifts.len().to_string().yellow()
    );

    if !analysis.auto_heal_actions.is_empty() {
        println!("auto-heal queue:");
        for action in &analysis.auto_heal_actions {
            println!("  {} ({})", action.resource_id, action.drift_type);
        }
    }
    if !analysis.approval_required.is_empty() {
        println!("approval queue (by severity):");
        for action in &analysis.approval_required {
            println!(
                "  [{}] {} ({})",
                action.severity.to_string().red(),
                action.resource_id,
                action.drift_type
            );
        }
    }
}

/// Render a heal batch report.
pub fn print_heal_report(report: &HealReport, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(report);
        return;
    }

    println!(
        "{} healed, {} failed, {} total",
        report.successful_heals.len().to_string().green(),
        report.failed_heals.len().to_string().red(),
        report.total_actions
    );
    for record in &report.failed_heals {
        println!(
            "  {} {} ({})",
            "!".red(),
            record.action.resource_id,
            record.action.drift_type
        );
    }
}

/// Render phase confirmation-prompt info.
pub fn print_phase_info(info: &PhaseInfo, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(info);
        return;
    }

    println!(
        "Phase {}: {} resource(s)",
        info.phase.bold(),
        info.resource_count
    );
    for id in &info.resources {
        println!("  {id}");
    }
    if info.safe_to_delete {
        println!("{}", "safe to delete".green());
    } else {
        println!("{}", "blocked by external dependents:".red());
        for blocking in &info.blocking {
            println!(
                "  {} <- {} ({})",
                blocking.resource_id, blocking.dependent_id, blocking.relationship_type
            );
        }
    }
}

/// Render the outcome of a phase deletion.
pub fn print_deletion_outcome(outcome: &PhaseDeletionOutcome, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(outcome);
        return;
    }

    match outcome {
        PhaseDeletionOutcome::Blocked { blocking } => {
            println!("{}", "Deletion blocked by external dependents:".red().bold());
            for dep in blocking {
                println!(
                    "  {} <- {} ({})",
                    dep.resource_id, dep.dependent_id, dep.relationship_type
                );
            }
            println!("Use --force to override");
        }
        PhaseDeletionOutcome::Executed(report) => {
            println!(
                "{} deleted, {} failed, {} skipped",
                report.deleted.len().to_string().green(),
                report.failed.len().to_string().red(),
                report.skipped.len()
            );
            for id in &report.deleted {
                println!("  - {id}");
            }
            for (id, error) in &report.failed {
                println!("  {} {id}: {error}", "!".red());
            }
        }
    }
}

/// Render graph statistics.
pub fn print_stats(stats: &GraphStats, mode: OutputMode) {
    if mode == OutputMode::Json {
        print_json(stats);
        return;
    }

    println!("nodes: {}   edges: {}", stats.nodes, stats.edges);
    println!(
        "states: {} healthy / {} drift / {} deleted / {} unknown",
        stats.healthy.to_string().green(),
        stats.drift.to_string().yellow(),
        stats.deleted.to_string().red(),
        stats.unknown
    );
}
