//! Command-line interface for the SweepX experiment runner.
//!
//! This module provides the top-level CLI application structure and
//! subcommands for running parameter-sweep experiments, validating
//! experiment files, inspecting application settings, and shell
//! completion generation.
//!
//! # Architecture
//!
//! The CLI is built using `clap` and follows a subcommand pattern:
//! - `run` - Execute an experiment file across a worker pool
//! - `check` - Parse and validate an experiment file without running it
//! - `config` - Inspect application settings
//! - `generate-completion` - Shell completion script generation
//!
//! # Examples
//!
//! ```bash
//! # Run an experiment with the worker count from the file
//! sweepx run experiment.yaml
//!
//! # Run with an explicit worker count
//! sweepx run experiment.yaml --workers 8
//!
//! # Validate a file before queueing a long run
//! sweepx check experiment.yaml
//! ```

mod check_args;
mod config_args;
mod generate_completion_args;
mod run_args;
pub mod table;
pub mod ui;

pub use check_args::CheckArgs;
use clap::{Parser, Subcommand};
pub use config_args::{ConfigAction, ConfigArgs};
pub use generate_completion_args::GenerateCompletionArgs;
pub use run_args::RunArgs;
pub use table::{create_comparison_table, ComparisonRow};
pub use ui::{create_task_spinner, print_success, print_warning};

/// Main CLI application structure defining the top-level interface.
#[derive(Parser, Debug)]
#[command(name = "sweepx-cli")]
#[command(about = "Parameter-sweep experiment runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the SweepX CLI application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a parameter-sweep experiment
    Run(RunArgs),

    /// Validate an experiment file without running it
    Check(CheckArgs),

    /// Inspect application settings
    Config(ConfigArgs),

    /// Generate shell completion scripts
    GenerateCompletion(GenerateCompletionArgs),
}

/// Executes the SweepX CLI application with parsed arguments.
///
/// This is the main entry point for CLI execution, routing parsed
/// command-line arguments to their respective command handlers. Errors
/// are propagated up to `main` for proper exit code handling.
pub async fn run() -> crate::Result<()> {
    let settings_service = std::sync::Arc::new(crate::config::ProductionSettingsService::new());
    run_with_settings(settings_service.as_ref()).await
}

/// Run the CLI with a provided settings service.
///
/// This function enables dependency injection of the settings layer,
/// making command behaviour testable without touching the user's
/// configuration directory.
///
/// # Errors
///
/// Returns an error if command execution fails.
pub async fn run_with_settings(
    settings_service: &dyn crate::config::SettingsService,
) -> crate::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            crate::commands::run_command::execute(args, settings_service).await?;
        }
        Commands::Check(args) => {
            crate::commands::check_command::execute(args)?;
        }
        Commands::Config(args) => {
            crate::commands::config_command::execute(args, settings_service)?;
        }
        Commands::GenerateCompletion(args) => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let cmd_name = cmd.get_name().to_string();
            let mut stdout = std::io::stdout();
            clap_complete::generate(args.shell, &mut cmd, cmd_name, &mut stdout);
        }
    }
    Ok(())
}
