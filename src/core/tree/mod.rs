//! The experiment tree: the scheduler's state machine.
//!
//! A parsed experiment is a recursive composition of two node kinds.
//! [`ComparisonNode`] enumerates the Cartesian product of its parameter
//! axes; [`OptimisedNode`] drives an optimiser over its axes. The tree
//! produces batches of ready tasks, absorbs finished tasks, and advances
//! until every node reports done.
//!
//! Done-ness means "no more tasks to produce": a node may be done while
//! its last batch is still executing, which is why the driver drains the
//! pool back into the tree after the root reports done.
mod comparison;
mod optimised;

pub use comparison::ComparisonNode;
pub use optimised::OptimisedNode;

use crate::core::optimiser::OptParams;
use crate::core::params::{ParamSpec, Params};
use crate::core::parallel::Task;
use crate::Result;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::path::PathBuf;

/// Which node kind a template describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Cartesian product enumeration
    Comparison,
    /// Optimiser-driven search
    Optimised,
}

/// Parsed description of one tree node, produced by the experiment file
/// loader and validated before any node is built.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    /// Node kind
    pub kind: NodeKind,
    /// Parameter axes in file order
    pub params: IndexMap<String, ParamSpec>,
    /// Command templates; required on leaves
    pub commands: Option<Vec<String>>,
    /// How many times each final configuration is evaluated
    pub repeat: usize,
    /// Optimiser name; present on optimised nodes
    pub optimiser: Option<String>,
    /// Optimiser run parameters
    pub opt_params: OptParams,
    /// Nested optimised child templates
    pub children: Vec<NodeTemplate>,
}

/// Root of an experiment tree.
pub enum TreeNode {
    /// Comparison root: ranked table output
    Comparison(ComparisonNode),
    /// Optimised root: optimal-assignment output
    Optimised(OptimisedNode),
}

impl TreeNode {
    /// Build the tree described by `template`.
    pub fn from_template(template: &NodeTemplate, wd: Option<PathBuf>) -> Result<Self> {
        match template.kind {
            NodeKind::Comparison => Ok(TreeNode::Comparison(ComparisonNode::from_template(
                template, wd,
            )?)),
            NodeKind::Optimised => Ok(TreeNode::Optimised(OptimisedNode::from_template(
                template, wd,
            )?)),
        }
    }

    /// Whether at least one task can be produced right now.
    pub fn is_task_ready(&self) -> bool {
        match self {
            TreeNode::Comparison(node) => node.is_task_ready(),
            TreeNode::Optimised(node) => node.is_task_ready(),
        }
    }

    /// Materialise and register the tasks that are ready.
    pub fn get_next_tasks<'a>(
        &'a mut self,
        parent_params: &'a Params,
    ) -> BoxFuture<'a, Result<Vec<Task>>> {
        match self {
            TreeNode::Comparison(node) => node.get_next_tasks(parent_params),
            TreeNode::Optimised(node) => node.get_next_tasks(parent_params),
        }
    }

    /// Deliver a finished task to the node that produced it. Returns
    /// whether the task was found in this tree.
    pub fn update_finished_task(&mut self, task: Task) -> bool {
        match self {
            TreeNode::Comparison(node) => node.update_finished_task(task),
            TreeNode::Optimised(node) => node.update_finished_task(task),
        }
    }

    /// Whether this node and every reachable descendant are finished.
    pub fn is_done(&mut self) -> bool {
        match self {
            TreeNode::Comparison(node) => node.is_done(),
            TreeNode::Optimised(node) => node.is_done(),
        }
    }

    /// Finished tasks recorded at the root, for summary reporting.
    pub fn finished_tasks(&self) -> &[Task] {
        match self {
            TreeNode::Comparison(node) => node.finished_tasks(),
            TreeNode::Optimised(node) => node.finished_tasks(),
        }
    }
}
