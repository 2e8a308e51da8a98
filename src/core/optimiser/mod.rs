//! Derivative-free optimisers behind a uniform pull/push front-end.
//!
//! Every optimiser is consumed through the same cycle: pull a location
//! with [`Optimiser::next_location`], evaluate it (a shell task does that
//! elsewhere), push the score back with [`Optimiser::update`], repeat
//! until [`Optimiser::is_done`]. Grid search implements the cycle
//! directly; the population-based and Bayesian backends are blocking
//! `optimize(objective)` calls inverted onto a companion thread by
//! [`threaded::ThreadedOptimiser`].
//!
//! The public contract is *maximisation* in *user* coordinates.
//! Log-scaled dimensions are stored internally as natural logarithms and
//! converted exactly once on each boundary crossing.
mod backends;
mod bayesian;
mod grid;
mod threaded;

pub use grid::GridSearchOptimiser;
pub use threaded::ThreadedOptimiser;

use crate::core::params::ParamValue;
use crate::error::SweepXError;
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;

/// Optimiser run parameters from the experiment file's `opt_params` tag.
pub type OptParams = IndexMap<String, f64>;

/// One continuous search dimension in user coordinates.
#[derive(Debug, Clone)]
pub struct ContinuousDim {
    /// Lower bound (user scale)
    pub low: f64,
    /// Upper bound (user scale)
    pub high: f64,
    /// Whether this dimension is searched on a log scale
    pub log_scale: bool,
}

/// Uniform front-end over all search algorithms.
#[async_trait]
pub trait Optimiser: Send {
    /// Next point to evaluate, in user coordinates, or `None` once the
    /// optimiser has produced its last point.
    async fn next_location(&mut self) -> Option<Vec<ParamValue>>;

    /// Report the score observed at a previously proposed location.
    fn update(&mut self, loc: &[ParamValue], score: f64);

    /// Whether the optimiser has finished.
    fn is_done(&mut self) -> bool;

    /// The highest-scoring location observed so far (user coordinates).
    fn best_location(&self) -> Option<Vec<ParamValue>>;

    /// The score at [`best_location`](Self::best_location).
    fn best_score(&self) -> Option<f64>;
}

/// Per-dimension log-scale mask applied on every boundary crossing.
#[derive(Debug, Clone)]
pub(crate) struct ScaleMap {
    log_scale: Vec<bool>,
}

impl ScaleMap {
    pub(crate) fn new(log_scale: Vec<bool>) -> Self {
        Self { log_scale }
    }

    /// User coordinates to internal coordinates (`ln` on log dims).
    pub(crate) fn to_internal(&self, loc: &[f64]) -> Vec<f64> {
        loc.iter()
            .zip(&self.log_scale)
            .map(|(v, log)| if *log { v.ln() } else { *v })
            .collect()
    }

    /// Internal coordinates back to user coordinates (`exp` on log dims).
    pub(crate) fn to_original(&self, loc: &[f64]) -> Vec<f64> {
        loc.iter()
            .zip(&self.log_scale)
            .map(|(v, log)| if *log { v.exp() } else { *v })
            .collect()
    }
}

/// Canonical rendering of a continuous location, used as the identity key
/// between a proposed point and its score update.
///
/// The precision is fixed so both paths hash identically even when a
/// backend round-trips the values.
pub(crate) fn canonical_key(loc: &[f64]) -> String {
    let parts: Vec<String> = loc.iter().map(|v| format!("{:.9}", v)).collect();
    parts.join(",")
}

/// Highest-score tracking shared by every optimiser.
///
/// The first reported score is accepted unconditionally, so objectives
/// that are negative everywhere still produce a best location.
#[derive(Debug, Default)]
pub(crate) struct BestTracker {
    best: Option<(Vec<ParamValue>, f64)>,
}

impl BestTracker {
    pub(crate) fn observe(&mut self, loc: &[ParamValue], score: f64) {
        match &self.best {
            Some((_, best)) if score <= *best => {}
            _ => self.best = Some((loc.to_vec(), score)),
        }
    }

    pub(crate) fn location(&self) -> Option<Vec<ParamValue>> {
        self.best.as_ref().map(|(loc, _)| loc.clone())
    }

    pub(crate) fn score(&self) -> Option<f64> {
        self.best.as_ref().map(|(_, score)| *score)
    }
}

fn require_param(name: &str, key: &str, opt_params: &OptParams) -> Result<f64> {
    opt_params.get(key).copied().ok_or_else(|| {
        SweepXError::config(format!(
            "tag \"{}\" required in \"opt_params\" tag for {} optimiser",
            key, name
        ))
    })
}

/// Check an optimiser name and its run parameters against the axes it
/// would search, without building anything.
///
/// Shared by the experiment validator (static pre-run checks) and by
/// [`create_optimiser`], so both report identical configuration errors.
pub fn validate_optimiser_config(
    name: &str,
    opt_params: &OptParams,
    n_continuous: usize,
    n_categorical: usize,
) -> Result<()> {
    match name {
        "GridSearch" => {
            let grid_res = require_param(name, "gridRes", opt_params)?;
            if grid_res < 1.0 {
                return Err(SweepXError::config(format!(
                    "\"gridRes\" must be at least 1, got {}",
                    grid_res
                )));
            }
            Ok(())
        }
        "BayesianOptimisation"
        | "ParticleSwarm"
        | "ManyOptimisingLiaisons"
        | "DifferentialEvolution"
        | "PatternSearch"
        | "LocalUnimodalSampling" => {
            if n_categorical > 0 {
                return Err(SweepXError::config(format!(
                    "{} optimiser only supports continuous parameters, got {} categorical axis(es)",
                    name, n_categorical
                )));
            }
            if n_continuous == 0 {
                return Err(SweepXError::config(format!(
                    "{} optimiser requires at least one continuous parameter",
                    name
                )));
            }
            let n_iterations = require_param(name, "n_iterations", opt_params)?;
            if n_iterations < 1.0 {
                return Err(SweepXError::config(format!(
                    "\"n_iterations\" must be at least 1, got {}",
                    n_iterations
                )));
            }
            Ok(())
        }
        _ => Err(SweepXError::config(format!(
            "Unknown optimiser \"{}\"",
            name
        ))),
    }
}

/// Build the optimiser named in the experiment file.
///
/// `dims` are the continuous axes in declaration order, `cat_vals` the
/// categorical axes appended after them. Incompatible combinations are
/// configuration errors raised before any task runs.
pub fn create_optimiser(
    name: &str,
    opt_params: &OptParams,
    dims: &[ContinuousDim],
    cat_vals: &[Vec<ParamValue>],
) -> Result<Box<dyn Optimiser>> {
    validate_optimiser_config(name, opt_params, dims.len(), cat_vals.len())?;
    match name {
        "GridSearch" => {
            let grid_res = require_param(name, "gridRes", opt_params)?;
            Ok(Box::new(GridSearchOptimiser::new(
                grid_res as usize,
                dims,
                cat_vals,
            )))
        }
        _ => {
            let n_iterations = require_param(name, "n_iterations", opt_params)?;
            let max_score = opt_params.get("max_score").copied();
            let seed = opt_params.get("seed").map(|s| *s as u64);
            Ok(Box::new(ThreadedOptimiser::spawn_seeded(
                name,
                n_iterations as usize,
                max_score,
                dims,
                seed,
            )?))
        }
    }
}
