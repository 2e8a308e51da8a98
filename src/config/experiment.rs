//! Experiment file schema and loading.
//!
//! An experiment is described in YAML under a top-level `experiment`
//! mapping: a name, a worker count, optional fixed parameters and
//! working directory, and exactly one of `comparison` or `optimised` as
//! the tree root. Node mappings nest further `optimised` children.
use crate::core::optimiser::OptParams;
use crate::core::params::{ParamSpec, ParamValue, Params};
use crate::core::tree::{NodeKind, NodeTemplate};
use crate::error::SweepXError;
use crate::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level document wrapper.
#[derive(Debug, Deserialize)]
pub struct ExperimentFile {
    /// The experiment description
    pub experiment: ExperimentSpec,
}

/// Raw experiment mapping as it appears in the file.
#[derive(Debug, Deserialize)]
pub struct ExperimentSpec {
    /// Experiment name; required
    pub name: Option<String>,
    /// Worker count; falls back to the application settings default
    pub workers: Option<usize>,
    /// Working directory for every command
    pub workdir: Option<PathBuf>,
    /// Fixed parameters available to every node
    #[serde(default)]
    pub fixed: IndexMap<String, serde_yaml_ng::Value>,
    /// Comparison root
    pub comparison: Option<NodeSpec>,
    /// Optimised root
    pub optimised: Option<NodeSpec>,
}

/// Raw node mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    /// Parameter axes in file order
    #[serde(default)]
    pub params: IndexMap<String, serde_yaml_ng::Value>,
    /// Shell command templates
    pub commands: Option<Vec<String>>,
    /// Evaluations per final configuration
    pub repeat: Option<i64>,
    /// Optimiser name (optimised nodes only)
    pub optimiser: Option<String>,
    /// Optimiser run parameters
    #[serde(default)]
    pub opt_params: OptParams,
    /// Nested optimised children: a single mapping or a list
    pub optimised: Option<OptimisedChildren>,
}

/// `optimised` accepts an object or a list of objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptimisedChildren {
    /// Single child node
    One(Box<NodeSpec>),
    /// Several child nodes
    Many(Vec<NodeSpec>),
}

impl OptimisedChildren {
    fn as_slice(&self) -> Vec<&NodeSpec> {
        match self {
            OptimisedChildren::One(node) => vec![node.as_ref()],
            OptimisedChildren::Many(nodes) => nodes.iter().collect(),
        }
    }
}

/// Fully parsed experiment, ready to drive.
#[derive(Debug)]
pub struct Experiment {
    /// Experiment name
    pub name: String,
    /// Worker count override from the file
    pub workers: Option<usize>,
    /// Working directory for every command
    pub workdir: Option<PathBuf>,
    /// Fixed parameters substituted into every command
    pub fixed: Params,
    /// Validated tree description
    pub root: NodeTemplate,
}

impl Experiment {
    /// Load and validate an experiment file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SweepXError::experiment_file(path.display().to_string(), e.to_string())
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate experiment YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ExperimentFile = serde_yaml_ng::from_str(text)?;
        let spec = file.experiment;

        let name = spec
            .name
            .clone()
            .ok_or_else(|| SweepXError::config("Tag \"name\" must be specified"))?;

        let root = match (&spec.comparison, &spec.optimised) {
            (Some(node), None) => node_template(node, NodeKind::Comparison)?,
            (None, Some(node)) => node_template(node, NodeKind::Optimised)?,
            (Some(_), Some(_)) => {
                return Err(SweepXError::config(
                    "\"experiment\" must contain exactly one of \"comparison\" or \"optimised\", got both",
                ))
            }
            (None, None) => {
                return Err(SweepXError::config(
                    "Could not find either element \"comparison\" or \"optimised\" in \"experiment\"",
                ))
            }
        };

        let experiment = Self {
            name,
            workers: spec.workers,
            workdir: spec.workdir.clone(),
            fixed: parse_fixed_params(&spec.fixed)?,
            root,
        };
        super::validator::validate_experiment(&experiment)?;
        Ok(experiment)
    }
}

/// Root `fixed` mapping: numbers stay numbers, strings are double-quoted
/// so they survive shell word-splitting.
fn parse_fixed_params(raw: &IndexMap<String, serde_yaml_ng::Value>) -> Result<Params> {
    let mut fixed = Params::new();
    for (name, value) in raw {
        let parsed = match value {
            serde_yaml_ng::Value::Number(n) => ParamValue::Number(yaml_number(name, n)?),
            serde_yaml_ng::Value::String(s) => ParamValue::Text(format!("\"{}\"", s)),
            other => {
                return Err(SweepXError::config(format!(
                    "fixed parameter \"{}\" must be a number or string, got {:?}",
                    name, other
                )))
            }
        };
        fixed.insert(name.clone(), parsed);
    }
    Ok(fixed)
}

fn yaml_number(name: &str, n: &serde_yaml_ng::Number) -> Result<f64> {
    n.as_f64().ok_or_else(|| {
        SweepXError::config(format!("parameter \"{}\": {} is not a finite number", name, n))
    })
}

fn param_spec(name: &str, value: &serde_yaml_ng::Value) -> Result<ParamSpec> {
    match value {
        serde_yaml_ng::Value::Number(n) => Ok(ParamSpec::FixedNumber(yaml_number(name, n)?)),
        serde_yaml_ng::Value::String(s) => ParamSpec::from_text(name, s),
        serde_yaml_ng::Value::Sequence(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_yaml_ng::Value::Number(n) => {
                        values.push(ParamValue::Number(yaml_number(name, n)?))
                    }
                    serde_yaml_ng::Value::String(s) => values.push(ParamValue::Text(s.clone())),
                    other => {
                        return Err(SweepXError::config(format!(
                            "parameter \"{}\": list entries must be numbers or strings, got {:?}",
                            name, other
                        )))
                    }
                }
            }
            if values.is_empty() {
                return Err(SweepXError::config(format!(
                    "parameter \"{}\": value list must not be empty",
                    name
                )));
            }
            Ok(ParamSpec::Categorical(values))
        }
        other => Err(SweepXError::config(format!(
            "parameter \"{}\" has unsupported value {:?}",
            name, other
        ))),
    }
}

fn node_template(spec: &NodeSpec, kind: NodeKind) -> Result<NodeTemplate> {
    let mut params = IndexMap::with_capacity(spec.params.len());
    for (name, value) in &spec.params {
        params.insert(name.clone(), param_spec(name, value)?);
    }

    let children = match &spec.optimised {
        Some(raw_children) => raw_children
            .as_slice()
            .into_iter()
            .map(|child| node_template(child, NodeKind::Optimised))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let repeat = spec.repeat.unwrap_or(1);
    if repeat < 1 {
        return Err(SweepXError::config(format!(
            "\"repeat\" must be at least 1, got {}",
            repeat
        )));
    }

    Ok(NodeTemplate {
        kind,
        params,
        commands: spec.commands.clone(),
        repeat: repeat as usize,
        optimiser: spec.optimiser.clone(),
        opt_params: spec.opt_params.clone(),
        children,
    })
}
