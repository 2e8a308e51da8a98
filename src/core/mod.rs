//! Core scheduling engine for SweepX.
//!
//! This module contains the subsystems that turn a parsed experiment
//! description into scored results:
//! - `params` for parameter specifications and command templating
//! - `parallel` for shell task execution across a worker pool
//! - `optimiser` for grid enumeration and inverted blocking search
//!   backends behind one pull/push interface
//! - `tree` for the recursive comparison/optimisation experiment tree
//!
pub mod optimiser;
pub mod parallel;
pub mod params;
pub mod tree;
