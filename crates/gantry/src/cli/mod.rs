//! CLI argument parsing and command dispatch.
//!
//! The CLI is a thin host over the library: it reads discovery payloads
//! from JSON files, drives the engine components through an [`crate::app::App`],
//! and renders structured results. All semantics live in the library.
//!
//! # Commands
//!
//! - `init`: Initialize a gantry project
//! - `register`: Register resource observations from a JSON file
//! - `list` / `show`: Inspect catalog records
//! - `impact` / `chain` / `explain`: Graph queries
//! - `heal-order`: Dependency-respecting healing order
//! - `analyze`: Classify drift findings (safe vs approval-required)
//! - `phase info` / `phase delete`: Phase deletion management
//! - `stats`: Graph statistics
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)

mod args;
pub mod execute;
mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{
    AnalyzeArgs, ChainArgs, ExplainArgs, HealOrderArgs, ImpactArgs, InitArgs, ListArgs, PhaseAction,
    PhaseArgs, RegisterArgs, ShowArgs, StatsArgs,
};
pub use types::StateArg;
pub use validators::{validate_phase_name, validate_resource_id};

/// Gantry - resource dependency graph and drift reconciliation engine
///
/// Tracks provisioned cloud resources, infers their dependencies, and
/// computes safe healing and deletion orderings. State is stored in
/// `.gantry/catalog.jsonl` for easy version control integration.
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new gantry project
    ///
    /// Creates the `.gantry/` directory with configuration and an empty
    /// catalog. Run once in your project root.
    Init(InitArgs),

    /// Register resource observations
    ///
    /// Reads one observation (or an array) from a JSON file, upserts the
    /// resources, and infers dependency edges from their metadata.
    Register(RegisterArgs),

    /// List catalog resources with optional filters
    List(ListArgs),

    /// Show one resource with its relationships
    Show(ShowArgs),

    /// Blast-radius query: who is affected if a resource fails
    Impact(ImpactArgs),

    /// Enumerate dependency chains from a resource to its roots
    Chain(ChainArgs),

    /// Explain whether (and why) one resource depends on another
    Explain(ExplainArgs),

    /// Compute a dependency-respecting healing order
    ///
    /// With no arguments, orders every resource currently in drift.
    HealOrder(HealOrderArgs),

    /// Classify drift findings from a JSON file
    ///
    /// Splits findings into auto-healable and approval-required queues
    /// and marks the affected resources as drifted.
    Analyze(AnalyzeArgs),

    /// Inspect or delete a deployment phase
    Phase(PhaseArgs),

    /// Show dependency graph statistics
    Stats(StatsArgs),
}

impl Cli {
    /// Parse CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing).
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid input.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails; the binary renders it and
    /// exits non-zero.
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Some(Commands::Init(args)) => execute::execute_init(args).await,
            Some(Commands::Register(args)) => {
                let mut app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_register(&mut app, args, output_mode).await
            }
            Some(Commands::List(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_list(&app, args, output_mode).await
            }
            Some(Commands::Show(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_show(&app, args, output_mode).await
            }
            Some(Commands::Impact(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_impact(&app, args, output_mode).await
            }
            Some(Commands::Chain(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_chain(&app, args, output_mode).await
            }
            Some(Commands::Explain(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_explain(&app, args, output_mode).await
            }
            Some(Commands::HealOrder(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_heal_order(&app, args, output_mode).await
            }
            Some(Commands::Analyze(args)) => {
                let mut app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_analyze(&mut app, args, output_mode).await
            }
            Some(Commands::Phase(args)) => {
                let mut app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_phase(&mut app, args, output_mode).await
            }
            Some(Commands::Stats(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_stats(&app, args, output_mode).await
            }
            None => {
                println!("Gantry drift reconciliation engine");
                println!("Use --help for more information");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== CLI Parsing Tests ==========

    #[test]
    fn parse_no_command() {
        let cli = Cli::try_parse_from(["gantry"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn parse_global_json_flag() {
        let cli = Cli::try_parse_from(["gantry", "--json", "stats"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::Stats(_))));
    }

    #[test]
    fn parse_init_quiet() {
        let cli = Cli::try_parse_from(["gantry", "init", "-q"]).unwrap();
        match cli.command {
            Some(Commands::Init(args)) => assert!(args.quiet),
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn parse_register() {
        let cli = Cli::try_parse_from(["gantry", "register", "--file", "discovered.json"]).unwrap();
        match cli.command {
            Some(Commands::Register(args)) => {
                assert_eq!(args.file.to_str(), Some("discovered.json"));
            }
            _ => panic!("Expected Register command"),
        }
    }

    #[test]
    fn parse_list_with_filters() {
        let cli = Cli::try_parse_from([
            "gantry", "list", "--state", "drift", "--phase", "net", "--type", "network::vpc",
            "-n", "10",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::List(args)) => {
                assert_eq!(args.state, Some(StateArg::Drift));
                assert_eq!(args.phase.as_deref(), Some("net"));
                assert_eq!(args.resource_type.as_deref(), Some("network::vpc"));
                assert_eq!(args.limit, 10);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn parse_list_rejects_bad_phase() {
        let result = Cli::try_parse_from(["gantry", "list", "--phase", "bad phase"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["gantry", "show", "vpc-1"]).unwrap();
        match cli.command {
            Some(Commands::Show(args)) => assert_eq!(args.resource_id, "vpc-1"),
            _ => panic!("Expected Show command"),
        }
    }

    #[test]
    fn parse_impact() {
        let cli = Cli::try_parse_from(["gantry", "impact", "vpc-1"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Impact(_))));
    }

    #[test]
    fn parse_explain() {
        let cli = Cli::try_parse_from(["gantry", "explain", "svc-1", "vpc-1"]).unwrap();
        match cli.command {
            Some(Commands::Explain(args)) => {
                assert_eq!(args.from, "svc-1");
                assert_eq!(args.to, "vpc-1");
            }
            _ => panic!("Expected Explain command"),
        }
    }

    #[test]
    fn parse_heal_order_defaults_to_empty() {
        let cli = Cli::try_parse_from(["gantry", "heal-order"]).unwrap();
        match cli.command {
            Some(Commands::HealOrder(args)) => assert!(args.resource_ids.is_empty()),
            _ => panic!("Expected HealOrder command"),
        }
    }

    #[test]
    fn parse_heal_order_with_targets() {
        let cli = Cli::try_parse_from(["gantry", "heal-order", "svc-1", "subnet-1"]).unwrap();
        match cli.command {
            Some(Commands::HealOrder(args)) => {
                assert_eq!(args.resource_ids, vec!["svc-1", "subnet-1"]);
            }
            _ => panic!("Expected HealOrder command"),
        }
    }

    #[test]
    fn parse_analyze() {
        let cli = Cli::try_parse_from(["gantry", "analyze", "--file", "findings.json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Analyze(_))));
    }

    #[test]
    fn parse_phase_info() {
        let cli = Cli::try_parse_from(["gantry", "phase", "info", "net"]).unwrap();
        match cli.command {
            Some(Commands::Phase(args)) => match args.action {
                PhaseAction::Info { phase } => assert_eq!(phase, "net"),
                PhaseAction::Delete { .. } => panic!("Expected Info action"),
            },
            _ => panic!("Expected Phase command"),
        }
    }

    #[test]
    fn parse_phase_delete_flags() {
        let cli = Cli::try_parse_from([
            "gantry",
            "phase",
            "delete",
            "net",
            "--force",
            "--yes",
            "--timeout-secs",
            "30",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Phase(args)) => match args.action {
                PhaseAction::Delete {
                    phase,
                    force,
                    yes,
                    timeout_secs,
                } => {
                    assert_eq!(phase, "net");
                    assert!(force);
                    assert!(yes);
                    assert_eq!(timeout_secs, Some(30));
                }
                PhaseAction::Info { .. } => panic!("Expected Delete action"),
            },
            _ => panic!("Expected Phase command"),
        }
    }

    #[test]
    fn parse_phase_delete_defaults() {
        let cli = Cli::try_parse_from(["gantry", "phase", "delete", "net"]).unwrap();
        match cli.command {
            Some(Commands::Phase(args)) => match args.action {
                PhaseAction::Delete {
                    force,
                    yes,
                    timeout_secs,
                    ..
                } => {
                    assert!(!force);
                    assert!(!yes);
                    assert!(timeout_secs.is_none());
                }
                PhaseAction::Info { .. } => panic!("Expected Delete action"),
            },
            _ => panic!("Expected Phase command"),
        }
    }

    #[test]
    fn parse_rejects_whitespace_resource_id() {
        let result = Cli::try_parse_from(["gantry", "show", "vpc 1"]);
        assert!(result.is_err());
    }
}
