//! Optimiser-driven search nodes.
use super::NodeTemplate;
use crate::core::optimiser::{create_optimiser, ContinuousDim, OptParams, Optimiser};
use crate::core::params::{fill_commands, join_params, ParamSpec, ParamValue, Params};
use crate::core::parallel::Task;
use crate::error::SweepXError;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use std::path::PathBuf;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Drives an optimiser over this node's continuous and categorical axes
/// and forwards the best configuration to the parent.
///
/// The optimiser is built lazily on the first `get_next_tasks` call so
/// that parent-supplied fixed parameters are in scope when the axes are
/// classified.
pub struct OptimisedNode {
    optimiser_name: String,
    opt_params: OptParams,
    params: IndexMap<String, ParamSpec>,
    child_templates: Vec<NodeTemplate>,
    children: Vec<OptimisedNode>,
    commands: Vec<String>,
    wd: Option<PathBuf>,
    running_tasks: Vec<u64>,
    finished_tasks: Vec<Task>,
    optimiser: Option<Box<dyn Optimiser>>,
    is_init: bool,
    closed: bool,
    fixed_params: Params,
    var_names: Vec<String>,
    /// Location awaiting the composite score of a nested search; doubles
    /// as the placeholder keeping this node busy while children run.
    pending_location: Option<Vec<ParamValue>>,
    nested_params: Params,
    best_child_params: Params,
    summary_printed: bool,
}

impl OptimisedNode {
    /// Build an optimised node from its template.
    pub fn from_template(template: &NodeTemplate, wd: Option<PathBuf>) -> Result<Self> {
        Self::from_template_with_point(template, &Params::new(), wd)
    }

    /// Build an optimised node with a comparison point's assignment
    /// merged in as fixed axes. The template's own axes shadow the point
    /// on name collisions.
    pub fn from_template_with_point(
        template: &NodeTemplate,
        point: &Params,
        wd: Option<PathBuf>,
    ) -> Result<Self> {
        let optimiser_name = template.optimiser.clone().ok_or_else(|| {
            SweepXError::config("Optimiser nodes must include an \"optimiser\" tag")
        })?;

        let mut params: IndexMap<String, ParamSpec> = point
            .iter()
            .map(|(name, value)| {
                let spec = match value {
                    ParamValue::Number(n) => ParamSpec::FixedNumber(*n),
                    ParamValue::Text(s) => ParamSpec::FixedText(s.clone()),
                };
                (name.clone(), spec)
            })
            .collect();
        for (name, spec) in &template.params {
            params.insert(name.clone(), spec.clone());
        }

        Ok(Self {
            optimiser_name,
            opt_params: template.opt_params.clone(),
            params,
            child_templates: template.children.clone(),
            children: Vec::new(),
            commands: template.commands.clone().unwrap_or_default(),
            wd,
            running_tasks: Vec::new(),
            finished_tasks: Vec::new(),
            optimiser: None,
            is_init: false,
            closed: false,
            fixed_params: Params::new(),
            var_names: Vec::new(),
            pending_location: None,
            nested_params: Params::new(),
            best_child_params: Params::new(),
            summary_printed: false,
        })
    }

    /// Classify the axes, fuse parent params into the fixed set, and
    /// build the optimiser.
    fn init(&mut self, parent_params: &Params) -> Result<()> {
        self.is_init = true;
        self.fixed_params = parent_params.clone();

        let mut dims: Vec<ContinuousDim> = Vec::new();
        let mut cat_names: Vec<String> = Vec::new();
        let mut cat_vals: Vec<Vec<ParamValue>> = Vec::new();

        for (name, spec) in &self.params {
            match spec {
                ParamSpec::FixedNumber(n) => {
                    self.fixed_params
                        .insert(name.clone(), ParamValue::Number(*n));
                }
                ParamSpec::FixedText(s) => {
                    self.fixed_params
                        .insert(name.clone(), ParamValue::Text(s.clone()));
                }
                ParamSpec::Categorical(values) => {
                    cat_names.push(name.clone());
                    cat_vals.push(values.clone());
                }
                ParamSpec::Linear { low, high } => {
                    self.var_names.push(name.clone());
                    dims.push(ContinuousDim {
                        low: *low,
                        high: *high,
                        log_scale: false,
                    });
                }
                ParamSpec::LogScale { low, high } => {
                    self.var_names.push(name.clone());
                    dims.push(ContinuousDim {
                        low: *low,
                        high: *high,
                        log_scale: true,
                    });
                }
            }
        }
        self.var_names.extend(cat_names);

        log::debug!(
            "initialising {} over {} continuous and {} categorical axis(es)",
            self.optimiser_name,
            dims.len(),
            cat_vals.len()
        );
        self.optimiser = Some(create_optimiser(
            &self.optimiser_name,
            &self.opt_params,
            &dims,
            &cat_vals,
        )?);
        Ok(())
    }

    /// Whether a task (or a child's task) can be produced right now.
    pub fn is_task_ready(&self) -> bool {
        if !self.is_init {
            return true;
        }
        if self.closed {
            return false;
        }
        if self.child_templates.is_empty() {
            return self.running_tasks.is_empty();
        }
        if self.children.iter().any(OptimisedNode::is_task_ready) {
            return true;
        }
        // Between nested searches: ready to pull the next location.
        self.children.is_empty() && self.pending_location.is_none()
    }

    /// Produce the tasks that are ready at this node.
    pub fn get_next_tasks<'a>(
        &'a mut self,
        parent_params: &'a Params,
    ) -> BoxFuture<'a, Result<Vec<Task>>> {
        async move {
            if !self.is_init {
                self.init(parent_params)?;
            }
            if self.closed {
                return Ok(Vec::new());
            }

            if self.child_templates.is_empty() {
                return self.next_leaf_task(parent_params).await;
            }
            self.next_nested_tasks(parent_params).await
        }
        .boxed()
    }

    /// Leaf production: one task per optimiser location.
    async fn next_leaf_task(&mut self, parent_params: &Params) -> Result<Vec<Task>> {
        if !self.running_tasks.is_empty() {
            return Ok(Vec::new());
        }
        let optimiser = self
            .optimiser
            .as_mut()
            .ok_or_else(|| SweepXError::scheduler("optimiser used before initialisation"))?;

        let Some(loc) = optimiser.next_location().await else {
            self.close();
            return Ok(Vec::new());
        };

        let loc_params: Params = self
            .var_names
            .iter()
            .cloned()
            .zip(loc.iter().cloned())
            .collect();
        let all_fixed = join_params(&self.fixed_params, parent_params);
        let assignment = join_params(&all_fixed, &loc_params);

        let task = Task::new(
            fill_commands(&self.commands, &assignment),
            assignment,
            Some(loc),
            self.wd.clone(),
        );
        self.running_tasks.push(task.id);
        Ok(vec![task])
    }

    /// Nested production: one fresh child per template per location; the
    /// children's best scores are summed into this node's optimiser.
    async fn next_nested_tasks(&mut self, parent_params: &Params) -> Result<Vec<Task>> {
        if self.children.is_empty() && self.pending_location.is_none() {
            let optimiser = self
                .optimiser
                .as_mut()
                .ok_or_else(|| SweepXError::scheduler("optimiser used before initialisation"))?;
            let Some(loc) = optimiser.next_location().await else {
                self.close();
                return Ok(Vec::new());
            };

            let loc_params: Params = self
                .var_names
                .iter()
                .cloned()
                .zip(loc.iter().cloned())
                .collect();
            let all_fixed = join_params(&self.fixed_params, parent_params);
            self.nested_params = join_params(&all_fixed, &loc_params);
            self.pending_location = Some(loc);

            for template in &self.child_templates {
                self.children
                    .push(OptimisedNode::from_template(template, self.wd.clone())?);
            }
        }

        let nested_params = self.nested_params.clone();
        let mut tasks = Vec::new();
        for i in (0..self.children.len()).rev() {
            if self.children[i].is_task_ready() {
                let child_tasks = self.children[i].get_next_tasks(&nested_params).await?;
                tasks.extend(child_tasks);
            }
        }
        Ok(tasks)
    }

    /// Whether the given task id is running in this subtree.
    pub fn holds_task(&self, id: u64) -> bool {
        self.running_tasks.contains(&id) || self.children.iter().any(|c| c.holds_task(id))
    }

    /// Deliver a finished task. Returns whether it belonged to this
    /// subtree.
    pub fn update_finished_task(&mut self, task: Task) -> bool {
        if let Some(pos) = self.running_tasks.iter().position(|id| *id == task.id) {
            self.running_tasks.remove(pos);
            self.absorb_score(&task);
            self.finished_tasks.push(task);
            return true;
        }

        let mut found = false;
        for child in &mut self.children {
            if child.holds_task(task.id) {
                found = child.update_finished_task(task);
                break;
            }
        }
        if found {
            self.settle_nested_search();
        }
        found
    }

    fn absorb_score(&mut self, task: &Task) {
        let Some(optimiser) = self.optimiser.as_mut() else {
            return;
        };
        let Some(loc) = &task.loc else {
            log::warn!("task {} finished without a search location", task.id);
            return;
        };
        // An errored task still produces an update so a blocking backend
        // waiting on this location is never starved.
        let score = task.score.unwrap_or(f64::NEG_INFINITY);
        optimiser.update(loc, score);
        if optimiser.is_done() {
            self.close();
        }
    }

    /// When every nested child is done, report the summed best scores to
    /// this node's optimiser and discard the children.
    fn settle_nested_search(&mut self) {
        if self.children.is_empty() || !self.children.iter().all(OptimisedNode::peek_done) {
            return;
        }
        let Some(loc) = self.pending_location.take() else {
            return;
        };

        let total: f64 = self
            .children
            .iter()
            .map(|child| child.best_score().unwrap_or(f64::NEG_INFINITY))
            .sum();
        let child_bests: Vec<Params> = self
            .children
            .iter()
            .map(OptimisedNode::best_params)
            .collect();
        for best in child_bests {
            self.best_child_params.extend(best);
        }
        self.children.clear();
        self.nested_params = Params::new();

        if let Some(optimiser) = self.optimiser.as_mut() {
            optimiser.update(&loc, total);
            if optimiser.is_done() {
                self.close();
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.print_optimisation_summary();
    }

    /// Done without requiring mutable access; used by parents scanning
    /// children mid-iteration.
    pub fn peek_done(&self) -> bool {
        self.is_init && self.closed && self.children.is_empty()
    }

    /// Whether this node and all spawned children are finished.
    pub fn is_done(&mut self) -> bool {
        // Give a threaded optimiser the chance to drain orphan registry
        // entries once it has finished.
        if let Some(optimiser) = self.optimiser.as_mut() {
            let _ = optimiser.is_done();
        }
        self.peek_done()
    }

    /// Best parameter assignment after optimisation: fixed params plus
    /// the optimiser's best location plus any nested best params.
    pub fn best_params(&self) -> Params {
        let mut best: Params = Params::new();
        if let Some(optimiser) = &self.optimiser {
            if let Some(loc) = optimiser.best_location() {
                for (name, value) in self.var_names.iter().zip(loc) {
                    best.insert(name.clone(), value);
                }
            }
        }
        let mut merged = join_params(&best, &self.fixed_params);
        merged = join_params(&self.best_child_params, &merged);
        merged
    }

    /// Best score reported to this node's optimiser.
    pub fn best_score(&self) -> Option<f64> {
        self.optimiser.as_ref().and_then(|o| o.best_score())
    }

    /// This node's command templates.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Tasks completed at this node, in completion order.
    pub fn finished_tasks(&self) -> &[Task] {
        &self.finished_tasks
    }

    fn print_optimisation_summary(&mut self) {
        if self.summary_printed {
            return;
        }
        self.summary_printed = true;

        let Some(optimiser) = &self.optimiser else {
            return;
        };
        let Some(best) = optimiser.best_location() else {
            log::warn!("{}: no scored location to summarise", self.optimiser_name);
            return;
        };

        println!("\n#######################\n# Optimisation summary:\n#######################");
        if !self.fixed_params.is_empty() {
            println!("Parent parameters:");
            println!("{}", params_table(&self.fixed_params));
        }
        println!("Optimal values:");
        let pretty: Params = self
            .var_names
            .iter()
            .cloned()
            .zip(best.iter().map(|value| match value {
                ParamValue::Number(n) => ParamValue::Text(format!("{:.4}", n)),
                ParamValue::Text(s) => ParamValue::Text(s.clone()),
            }))
            .collect();
        println!("{}", params_table(&pretty));
    }
}

fn params_table(params: &Params) -> String {
    let mut builder = Builder::default();
    builder.push_record(params.keys().cloned());
    builder.push_record(params.values().map(ToString::to_string));
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::NodeKind;

    fn grid_template(grid_res: f64, params: IndexMap<String, ParamSpec>) -> NodeTemplate {
        let mut opt_params = OptParams::new();
        opt_params.insert("gridRes".to_string(), grid_res);
        NodeTemplate {
            kind: NodeKind::Optimised,
            params,
            commands: Some(vec!["echo ${x}".to_string()]),
            repeat: 1,
            optimiser: Some("GridSearch".to_string()),
            opt_params,
            children: Vec::new(),
        }
    }

    fn linear(low: f64, high: f64) -> ParamSpec {
        ParamSpec::Linear { low, high }
    }

    async fn run_to_completion(node: &mut OptimisedNode, score_of: impl Fn(&Params) -> f64) -> usize {
        let fixed = Params::new();
        let mut steps = 0;
        loop {
            let tasks = node.get_next_tasks(&fixed).await.unwrap();
            if tasks.is_empty() && node.is_done() {
                break;
            }
            for mut task in tasks {
                task.score = Some(score_of(&task.params));
                assert!(node.update_finished_task(task));
                steps += 1;
            }
        }
        steps
    }

    #[tokio::test]
    async fn test_grid_leaf_produces_one_task_at_a_time() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), linear(0.0, 1.0));
        let mut node =
            OptimisedNode::from_template(&grid_template(3.0, params), None).unwrap();

        let tasks = node.get_next_tasks(&Params::new()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        // Node is busy until its running task is updated.
        assert!(!node.is_task_ready());
        assert!(node.get_next_tasks(&Params::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grid_leaf_visits_every_point_then_closes() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), linear(0.0, 1.0));
        let mut node =
            OptimisedNode::from_template(&grid_template(5.0, params), None).unwrap();

        let steps = run_to_completion(&mut node, |p| p["x"].as_number().unwrap_or(0.0)).await;
        assert_eq!(steps, 5);
        assert!(node.is_done());
        let best = node.best_params();
        assert_eq!(best["x"], ParamValue::Number(1.0));
    }

    #[tokio::test]
    async fn test_missing_optimiser_tag_is_config_error() {
        let template = NodeTemplate {
            kind: NodeKind::Optimised,
            params: IndexMap::new(),
            commands: Some(vec!["echo 1".to_string()]),
            repeat: 1,
            optimiser: None,
            opt_params: OptParams::new(),
            children: Vec::new(),
        };
        let err = match OptimisedNode::from_template(&template, None) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(err.to_string().contains("optimiser"));
    }

    #[tokio::test]
    async fn test_fixed_and_parent_params_flow_into_tasks() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), linear(0.0, 1.0));
        params.insert("label".to_string(), ParamSpec::FixedText("\"run\"".to_string()));
        let mut node =
            OptimisedNode::from_template(&grid_template(2.0, params), None).unwrap();

        let mut parent = Params::new();
        parent.insert("seed".to_string(), ParamValue::Number(7.0));
        let tasks = node.get_next_tasks(&parent).await.unwrap();
        let task = &tasks[0];
        assert_eq!(task.params["seed"], ParamValue::Number(7.0));
        assert_eq!(task.params["label"], ParamValue::Text("\"run\"".to_string()));
        assert!(task.params.contains_key("x"));
        assert!(task.loc.is_some());
    }

    #[tokio::test]
    async fn test_comparison_point_is_fused_as_fixed_params() {
        let mut params = IndexMap::new();
        params.insert("u".to_string(), linear(0.1, 2.0));
        let template = grid_template(4.0, params);

        let mut point = Params::new();
        point.insert("method".to_string(), ParamValue::Text("methodA".to_string()));
        let mut node =
            OptimisedNode::from_template_with_point(&template, &point, None).unwrap();

        let steps = run_to_completion(&mut node, |p| p["u"].as_number().unwrap_or(0.0)).await;
        assert_eq!(steps, 4);
        let best = node.best_params();
        assert_eq!(best["method"], ParamValue::Text("methodA".to_string()));
        let u = best["u"].as_number().expect("number");
        assert!((u - 2.0).abs() < 1e-9, "best u {} not at upper bound", u);
    }

    #[tokio::test]
    async fn test_errored_task_still_advances_the_optimiser() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), linear(0.0, 1.0));
        let mut node =
            OptimisedNode::from_template(&grid_template(2.0, params), None).unwrap();

        let fixed = Params::new();
        let mut tasks = node.get_next_tasks(&fixed).await.unwrap();
        let mut errored = tasks.remove(0);
        errored.error = Some("exit status 1".to_string());
        assert!(node.update_finished_task(errored));

        let mut tasks = node.get_next_tasks(&fixed).await.unwrap();
        assert_eq!(tasks.len(), 1);
        let mut ok = tasks.remove(0);
        ok.score = Some(3.0);
        assert!(node.update_finished_task(ok));

        assert!(node.is_done());
        assert_eq!(node.best_score(), Some(3.0));
    }

    #[tokio::test]
    async fn test_nested_search_sums_child_best_scores() {
        // Outer grid over x in {0, 1}; inner grid over y in {0, 1, 2}.
        let mut inner_params = IndexMap::new();
        inner_params.insert("y".to_string(), linear(0.0, 2.0));
        let inner = grid_template(3.0, inner_params);

        let mut outer_params = IndexMap::new();
        outer_params.insert("x".to_string(), linear(0.0, 1.0));
        let mut outer = grid_template(2.0, outer_params);
        outer.commands = None;
        outer.children = vec![inner];

        let mut node = OptimisedNode::from_template(&outer, None).unwrap();
        let fixed = Params::new();
        let mut evaluated = 0;
        loop {
            let tasks = node.get_next_tasks(&fixed).await.unwrap();
            if tasks.is_empty() && node.is_done() {
                break;
            }
            for mut task in tasks {
                // Score favours large x and large y.
                let x = task.params["x"].as_number().unwrap_or(0.0);
                let y = task.params["y"].as_number().unwrap_or(0.0);
                task.score = Some(x + y);
                assert!(node.update_finished_task(task));
                evaluated += 1;
            }
        }
        // Two outer locations, each driving a fresh 3-point inner search.
        assert_eq!(evaluated, 6);
        assert!(node.is_done());
        // The outer best is the location whose inner search summed best.
        assert_eq!(node.best_score(), Some(3.0));
        let best = node.best_params();
        assert_eq!(best["x"], ParamValue::Number(1.0));
        assert_eq!(best["y"], ParamValue::Number(2.0));
    }
}
