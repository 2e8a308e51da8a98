//! Command-line arguments for running an experiment.
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Experiment configuration file (YAML)
    pub config: PathBuf,

    /// Override the worker count from the experiment file
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Override the working directory for every command
    #[arg(long)]
    pub workdir: Option<PathBuf>,
}
