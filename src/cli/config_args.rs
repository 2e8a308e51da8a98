//! Command-line arguments for inspecting application settings.
use clap::{Args, Subcommand};

/// Arguments for the `config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// The settings action to perform; defaults to `show`
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Settings inspection operations.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings as TOML
    Show,
    /// Print the settings file path
    Path,
}
