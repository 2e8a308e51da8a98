//! Cartesian-product comparison nodes.
use super::{NodeTemplate, OptimisedNode};
use crate::core::params::{fill_commands, join_params, ParamValue, Params};
use crate::core::parallel::Task;
use crate::error::SweepXError;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;

/// Evaluates the full Cartesian product of its parameter axes, each
/// point repeated `repeat` times.
///
/// A leaf emits its whole batch in one call and is immediately done.
/// With children, every child is instantiated once per product point at
/// construction; as each child finishes, its best configuration is
/// re-evaluated `repeat` times and the child is removed.
pub struct ComparisonNode {
    param_names: Vec<String>,
    all_param_vals: Vec<Vec<ParamValue>>,
    children: Vec<OptimisedNode>,
    commands: Vec<String>,
    repeat: usize,
    wd: Option<PathBuf>,
    running_tasks: Vec<u64>,
    finished_tasks: Vec<Task>,
    done: bool,
    is_leaf: bool,
}

impl ComparisonNode {
    /// Build a comparison node, expanding one optimised child per product
    /// point when child templates are declared.
    pub fn from_template(template: &NodeTemplate, wd: Option<PathBuf>) -> Result<Self> {
        let mut axes: Vec<Vec<ParamValue>> = Vec::with_capacity(template.params.len());
        let mut param_names = Vec::with_capacity(template.params.len());
        for (name, spec) in &template.params {
            let values = spec.enumerable_values().ok_or_else(|| {
                SweepXError::config(format!(
                    "comparison parameter \"{}\" cannot be a continuous range",
                    name
                ))
            })?;
            param_names.push(name.clone());
            axes.push(values);
        }
        let all_param_vals = cartesian_product(&axes);

        let mut children = Vec::new();
        let is_leaf = template.children.is_empty();
        if !is_leaf {
            for child_template in &template.children {
                for point in &all_param_vals {
                    let point_params: Params = param_names
                        .iter()
                        .cloned()
                        .zip(point.iter().cloned())
                        .collect();
                    children.push(OptimisedNode::from_template_with_point(
                        child_template,
                        &point_params,
                        wd.clone(),
                    )?);
                }
            }
        }

        Ok(Self {
            param_names,
            all_param_vals,
            children,
            commands: template.commands.clone().unwrap_or_default(),
            repeat: template.repeat,
            wd,
            running_tasks: Vec::new(),
            finished_tasks: Vec::new(),
            done: false,
            is_leaf,
        })
    }

    /// Whether a call to [`get_next_tasks`](Self::get_next_tasks) would
    /// produce tasks right now.
    pub fn is_task_ready(&self) -> bool {
        if self.is_leaf {
            return !self.done;
        }
        if self.children.iter().any(OptimisedNode::is_task_ready) {
            return true;
        }
        self.children.iter().any(OptimisedNode::peek_done)
    }

    /// Produce the tasks that are ready at this node.
    pub fn get_next_tasks<'a>(
        &'a mut self,
        parent_params: &'a Params,
    ) -> BoxFuture<'a, Result<Vec<Task>>> {
        async move {
            if self.done {
                return Ok(Vec::new());
            }

            // A leaf returns the whole batch at once and is then done.
            if self.is_leaf {
                let mut tasks = Vec::with_capacity(self.repeat * self.all_param_vals.len());
                for _ in 0..self.repeat {
                    for point in &self.all_param_vals {
                        let point_params: Params = self
                            .param_names
                            .iter()
                            .cloned()
                            .zip(point.iter().cloned())
                            .collect();
                        let joined = join_params(parent_params, &point_params);
                        let task = Task::new(
                            fill_commands(&self.commands, &joined),
                            joined,
                            None,
                            self.wd.clone(),
                        );
                        self.running_tasks.push(task.id);
                        tasks.push(task);
                    }
                }
                self.done = true;
                return Ok(tasks);
            }

            // Children finish at different times; reverse iteration lets
            // finished ones be removed by index mid-loop.
            let mut tasks = Vec::new();
            for i in (0..self.children.len()).rev() {
                if self.children[i].is_task_ready() {
                    let child_tasks = self.children[i].get_next_tasks(parent_params).await?;
                    tasks.extend(child_tasks);
                } else if self.children[i].peek_done() {
                    let child = self.children.remove(i);
                    let best_params = child.best_params();
                    let commands = child.commands();
                    for _ in 0..self.repeat {
                        let task = Task::new(
                            fill_commands(commands, &best_params),
                            best_params.clone(),
                            None,
                            self.wd.clone(),
                        );
                        self.running_tasks.push(task.id);
                        tasks.push(task);
                    }
                }
            }
            if self.children.is_empty() {
                self.done = true;
            }
            Ok(tasks)
        }
        .boxed()
    }

    /// Route a finished task to its owning node. Returns whether the task
    /// belonged to this subtree.
    pub fn update_finished_task(&mut self, task: Task) -> bool {
        if let Some(pos) = self.running_tasks.iter().position(|id| *id == task.id) {
            self.running_tasks.remove(pos);
            self.finished_tasks.push(task);
            return true;
        }
        for child in &mut self.children {
            if child.holds_task(task.id) {
                return child.update_finished_task(task);
            }
        }
        false
    }

    /// Whether this node and all remaining children are finished.
    pub fn is_done(&mut self) -> bool {
        if self.children.iter_mut().any(|child| !child.is_done()) {
            return false;
        }
        self.done
    }

    /// Tasks completed at this node, in completion order.
    pub fn finished_tasks(&self) -> &[Task] {
        &self.finished_tasks
    }
}

/// Ordered Cartesian product; the last axis varies fastest.
fn cartesian_product(axes: &[Vec<ParamValue>]) -> Vec<Vec<ParamValue>> {
    let mut product: Vec<Vec<ParamValue>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(product.len() * axis.len());
        for prefix in &product {
            for value in axis {
                let mut point = prefix.clone();
                point.push(value.clone());
                next.push(point);
            }
        }
        product = next;
    }
    product
}
