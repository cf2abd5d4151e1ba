//! CLI argument structs for all commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::types::StateArg;
use super::validators::{validate_phase_name, validate_resource_id};

/// Arguments for the `init` command.
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Suppress output messages.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `register` command.
#[derive(Parser, Debug, Clone)]
pub struct RegisterArgs {
    /// Path to a JSON file containing one resource observation or an
    /// array of them (fields: resource_id, resource_type, phase, metadata).
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Filter by lifecycle state.
    #[arg(short, long, value_enum)]
    pub state: Option<StateArg>,

    /// Filter by deployment phase.
    #[arg(short, long, value_parser = validate_phase_name)]
    pub phase: Option<String>,

    /// Filter by resource type.
    #[arg(short = 't', long = "type")]
    pub resource_type: Option<String>,

    /// Maximum number of resources to display.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Resource ID to display.
    #[arg(value_parser = validate_resource_id)]
    pub resource_id: String,
}

/// Arguments for the `impact` command.
#[derive(Parser, Debug, Clone)]
pub struct ImpactArgs {
    /// Resource whose blast radius to compute.
    #[arg(value_parser = validate_resource_id)]
    pub resource_id: String,
}

/// Arguments for the `chain` command.
#[derive(Parser, Debug, Clone)]
pub struct ChainArgs {
    /// Resource whose dependency chains to enumerate.
    #[arg(value_parser = validate_resource_id)]
    pub resource_id: String,
}

/// Arguments for the `explain` command.
#[derive(Parser, Debug, Clone)]
pub struct ExplainArgs {
    /// The (potential) dependent resource.
    #[arg(value_parser = validate_resource_id)]
    pub from: String,

    /// The (potential) dependency.
    #[arg(value_parser = validate_resource_id)]
    pub to: String,
}

/// Arguments for the `heal-order` command.
#[derive(Parser, Debug, Clone)]
pub struct HealOrderArgs {
    /// Resources to order. When omitted, every drifted resource is used.
    #[arg(value_parser = validate_resource_id)]
    pub resource_ids: Vec<String>,
}

/// Arguments for the `analyze` command.
#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Path to a JSON file containing an array of drift findings
    /// (fields: resource_id, resource_type, drift_type, observed, desired).
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Arguments for the `phase` command.
#[derive(Parser, Debug, Clone)]
pub struct PhaseArgs {
    /// Phase action to perform.
    #[command(subcommand)]
    pub action: PhaseAction,
}

/// Phase subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PhaseAction {
    /// Show phase membership and deletion safety.
    Info {
        /// Phase name.
        #[arg(value_parser = validate_phase_name)]
        phase: String,
    },

    /// Delete a phase (dependents first).
    ///
    /// Without `--yes` this only renders the confirmation info. External
    /// dependents block deletion unless `--force` is given.
    Delete {
        /// Phase name.
        #[arg(value_parser = validate_phase_name)]
        phase: String,

        /// Proceed even when external dependents exist, and continue past
        /// individual failures.
        #[arg(long)]
        force: bool,

        /// Skip the confirmation step and execute the deletion.
        #[arg(short, long)]
        yes: bool,

        /// Overall time budget for the deletion batch, in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

/// Arguments for the `stats` command.
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {}
