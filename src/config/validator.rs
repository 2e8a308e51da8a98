//! Static validation of parsed experiment descriptions.
//!
//! Everything checked here must surface as a configuration error before
//! any task runs: missing tags, unknown optimisers, incompatible
//! optimiser/axis combinations, and malformed counts. The same optimiser
//! rules are enforced again at node initialisation via the shared
//! [`validate_optimiser_config`] helper.
use crate::config::Experiment;
use crate::core::optimiser::validate_optimiser_config;
use crate::core::params::ParamSpec;
use crate::core::tree::{NodeKind, NodeTemplate};
use crate::error::SweepXError;
use crate::Result;

/// Validate a parsed experiment.
pub fn validate_experiment(experiment: &Experiment) -> Result<()> {
    if let Some(workers) = experiment.workers {
        if workers < 1 {
            return Err(SweepXError::config(format!(
                "\"workers\" must be at least 1, got {}",
                workers
            )));
        }
    }
    validate_node(&experiment.root)
}

fn validate_node(template: &NodeTemplate) -> Result<()> {
    if template.children.is_empty() {
        match &template.commands {
            Some(commands) if !commands.is_empty() => {}
            _ => {
                return Err(SweepXError::config(
                    "All leaf nodes must include a non-empty \"commands\" tag",
                ))
            }
        }
    }

    match template.kind {
        NodeKind::Comparison => {
            for (name, spec) in &template.params {
                if spec.is_continuous() {
                    return Err(SweepXError::config(format!(
                        "comparison parameter \"{}\" cannot be a continuous range",
                        name
                    )));
                }
            }
        }
        NodeKind::Optimised => {
            let optimiser = template.optimiser.as_deref().ok_or_else(|| {
                SweepXError::config("Optimiser nodes must include an \"optimiser\" tag")
            })?;
            let n_continuous = template
                .params
                .values()
                .filter(|spec| spec.is_continuous())
                .count();
            let n_categorical = template
                .params
                .values()
                .filter(|spec| matches!(spec, ParamSpec::Categorical(_)))
                .count();
            validate_optimiser_config(optimiser, &template.opt_params, n_continuous, n_categorical)?;
        }
    }

    for child in &template.children {
        validate_node(child)?;
    }
    Ok(())
}
