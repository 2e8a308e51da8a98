//! Run command implementation: the experiment driver loop.
//!
//! The driver owns the coupling between the experiment tree and the
//! worker pool: it pulls every ready task out of the tree, hands the
//! batch to the pool, and routes each completion back into the tree.
//! Readiness is re-checked after every batch because absorbing one
//! completion can make a previously idle optimiser produce its next
//! location.
use crate::cli::ui::{create_task_spinner, print_warning};
use crate::cli::{table::ComparisonRow, RunArgs};
use crate::config::{Experiment, SettingsService};
use crate::core::params::Params;
use crate::core::parallel::{Task, WorkerPool};
use crate::core::tree::{ComparisonNode, TreeNode};
use crate::Result;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use std::time::{Duration, Instant};

/// Execute the `run` subcommand.
pub async fn execute(args: RunArgs, settings_service: &dyn SettingsService) -> Result<()> {
    let experiment = Experiment::load(&args.config)?;
    let settings = settings_service.settings()?;
    let workers = args
        .workers
        .or(experiment.workers)
        .unwrap_or(settings.general.default_workers);
    let workdir = args.workdir.clone().or_else(|| experiment.workdir.clone());

    let mut root = TreeNode::from_template(&experiment.root, workdir)?;
    log::info!(
        "experiment \"{}\" starting with {} worker(s)",
        experiment.name,
        workers
    );
    println!("Starting experiments.");
    let started = Instant::now();

    let spinner = settings.general.progress.then(create_task_spinner);
    let outcome = run_tree(&mut root, &experiment.fixed, workers, spinner.as_ref()).await?;
    if let Some(progress) = &spinner {
        progress.finish_and_clear();
    }

    println!(
        "\nAll done.\nTime elapsed: {}.",
        pretty_time(started.elapsed())
    );
    if outcome.errored > 0 {
        print_warning(&format!(
            "{} task(s) failed; their scores are missing from the summary",
            outcome.errored
        ));
    }

    if let TreeNode::Comparison(node) = &root {
        print_comparison_summary(node);
    }
    Ok(())
}

/// Result counters for a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Tasks that came back from the pool
    pub finished: usize,
    /// Tasks that came back errored
    pub errored: usize,
}

/// Drive `root` to completion over a fresh pool of `workers` workers.
pub async fn run_tree(
    root: &mut TreeNode,
    fixed: &Params,
    workers: usize,
    progress: Option<&ProgressBar>,
) -> Result<RunOutcome> {
    let mut pool = WorkerPool::new(workers);
    let mut outcome = RunOutcome {
        finished: 0,
        errored: 0,
    };

    loop {
        // Completing a task can unblock an optimiser, so readiness must
        // be re-checked between batches.
        while root.is_task_ready() {
            let tasks = root.get_next_tasks(fixed).await?;
            if tasks.is_empty() {
                break;
            }
            pool.submit_all(tasks)?;
        }

        if root.is_done() {
            pool.end();
            // Done means "no more tasks to produce"; the last batch may
            // still be in flight, so drain it back into the tree.
            while let Some(task) = pool.next_finished().await {
                absorb(root, task, &mut outcome, progress);
            }
            pool.join().await;
            break;
        }

        match pool.next_finished().await {
            Some(task) => absorb(root, task, &mut outcome, progress),
            None => break,
        }
    }
    Ok(outcome)
}

fn absorb(root: &mut TreeNode, task: Task, outcome: &mut RunOutcome, progress: Option<&ProgressBar>) {
    if let Some(progress) = progress {
        progress.inc(1);
    }
    outcome.finished += 1;
    if task.error.is_some() {
        outcome.errored += 1;
    }
    let id = task.id;
    if !root.update_finished_task(task) {
        log::warn!("finished task {} not found in the tree; dropping", id);
    }
}

/// Rank every parameter combination by mean score and print the table.
fn print_comparison_summary(node: &ComparisonNode) {
    let scored: Vec<&Task> = node
        .finished_tasks()
        .iter()
        .filter(|task| task.succeeded())
        .collect();
    let Some(first) = scored.first() else {
        print_warning("no scored tasks to summarise");
        return;
    };

    let columns: Vec<String> = first.params.keys().cloned().collect();
    let mut groups: IndexMap<Vec<String>, Vec<f64>> = IndexMap::new();
    for task in &scored {
        let key: Vec<String> = columns
            .iter()
            .map(|name| {
                task.params
                    .get(name)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect();
        groups
            .entry(key)
            .or_default()
            .push(task.score.unwrap_or_default());
    }

    let mut rows: Vec<ComparisonRow> = groups
        .into_iter()
        .map(|(values, scores)| {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            let variance =
                scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
            ComparisonRow {
                values,
                mean,
                std_dev: variance.sqrt(),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.mean.total_cmp(&a.mean));

    println!("\n#####################\n# Comparison summary:\n#####################\n");
    println!(
        "{}",
        crate::cli::table::create_comparison_table(&columns, &rows)
    );
}

fn pretty_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, total % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, total % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_time_formats() {
        assert_eq!(pretty_time(Duration::from_millis(4200)), "4.2s");
        assert_eq!(pretty_time(Duration::from_secs(184)), "3m 4s");
        assert_eq!(pretty_time(Duration::from_secs(7384)), "2h 3m 4s");
    }

    #[tokio::test]
    async fn test_run_tree_completes_a_leaf_comparison() {
        let experiment = Experiment::from_yaml(
            r#"
experiment:
  name: tiny
  comparison:
    params: {a: [1, 2, 3]}
    commands: ["echo ${a}"]
    repeat: 3
"#,
        )
        .unwrap();
        let mut root = TreeNode::from_template(&experiment.root, None).unwrap();
        let outcome = run_tree(&mut root, &experiment.fixed, 4, None).await.unwrap();
        assert_eq!(outcome.finished, 9);
        assert_eq!(outcome.errored, 0);
        assert!(root.is_done());
        assert_eq!(root.finished_tasks().len(), 9);
    }

    #[tokio::test]
    async fn test_run_tree_counts_errored_tasks() {
        let experiment = Experiment::from_yaml(
            r#"
experiment:
  name: flaky
  comparison:
    params: {a: [0, 1]}
    commands: ["exit ${a}"]
"#,
        )
        .unwrap();
        let mut root = TreeNode::from_template(&experiment.root, None).unwrap();
        let outcome = run_tree(&mut root, &experiment.fixed, 2, None).await.unwrap();
        assert_eq!(outcome.finished, 2);
        // `exit 1` fails, `exit 0` produces no output to score.
        assert_eq!(outcome.errored, 2);
    }

    #[tokio::test]
    async fn test_run_tree_drives_a_grid_optimisation() {
        let experiment = Experiment::from_yaml(
            r#"
experiment:
  name: grid
  optimised:
    optimiser: GridSearch
    opt_params: {gridRes: 5}
    params:
      x: "linear(0, 1)"
      y: "logscale(1, 100)"
    commands: ["echo ${x} ${y} >/dev/null; echo ${x}"]
"#,
        )
        .unwrap();
        let mut root = TreeNode::from_template(&experiment.root, None).unwrap();
        let outcome = run_tree(&mut root, &experiment.fixed, 2, None).await.unwrap();
        assert_eq!(outcome.finished, 25);
        assert!(root.is_done());
    }
}
