//! Configuration for SweepX.
//!
//! Two layers, kept separate on purpose:
//! - [`experiment`] parses and validates the YAML file describing *what*
//!   to run: the tree of comparison and optimisation nodes.
//! - [`service`] provides the machine-local application settings that
//!   describe *how* to run it (default worker count, progress display),
//!   behind the [`SettingsService`] trait for dependency injection.
pub mod experiment;
pub mod service;
pub mod validator;

pub use experiment::{Experiment, ExperimentFile, ExperimentSpec, NodeSpec};
pub use service::{
    GeneralSettings, ProductionSettingsService, Settings, SettingsService, StaticSettingsService,
};
