//! Command-line arguments for validating an experiment file.
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Experiment configuration file (YAML)
    pub config: PathBuf,
}
