//! Task definition and shell execution.
//!
//! A task is the unit of work handed to a worker: an ordered, non-empty
//! sequence of already-substituted shell commands plus the parameter
//! assignment that produced them. The worker runs the commands one after
//! another and keeps the score of the last command only.
use crate::core::params::{ParamValue, Params};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;

// Process-wide monotonic task id source.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A unit of work submitted to the worker pool.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique, monotonically increasing identifier
    pub id: u64,
    /// Shell commands to run in order; only the last command is scored
    pub commands: Vec<String>,
    /// Parameter assignment this task evaluates
    pub params: Params,
    /// Location in the owning optimiser's search space, if any
    pub loc: Option<Vec<ParamValue>>,
    /// Working directory for the commands; the driver's cwd when unset
    pub wd: Option<PathBuf>,
    /// Score parsed from the last command's stdout, set once by the worker
    pub score: Option<f64>,
    /// Failure description when the task errored
    pub error: Option<String>,
}

impl Task {
    /// Create a task with a fresh unique id. `commands` must be non-empty;
    /// the experiment validator guarantees this before any task is built.
    pub fn new(
        commands: Vec<String>,
        params: Params,
        loc: Option<Vec<ParamValue>>,
        wd: Option<PathBuf>,
    ) -> Self {
        Self {
            id: next_task_id(),
            commands,
            params,
            loc,
            wd,
            score: None,
            error: None,
        }
    }

    /// Whether this task completed with a score.
    pub fn succeeded(&self) -> bool {
        self.score.is_some() && self.error.is_none()
    }

    /// Run all commands in order, keeping the score of the last one.
    ///
    /// A non-zero exit status or an unparseable final stdout line marks the
    /// task as errored; earlier command scores are discarded either way.
    pub async fn run(&mut self) {
        let mut last_score = None;
        for command in &self.commands {
            match run_command(command, self.wd.as_deref()).await {
                Ok(score) => last_score = Some(score),
                Err(message) => {
                    log::error!("task {}: {}", self.id, message);
                    self.error = Some(message);
                    return;
                }
            }
        }
        self.score = last_score;
    }
}

/// Run one command through the shell and parse its score.
///
/// The score is the second-to-last newline-split element of captured
/// stdout; the last element is the empty string after the trailing
/// newline.
async fn run_command(command: &str, wd: Option<&std::path::Path>) -> Result<f64, String> {
    let mut shell = Command::new("bash");
    shell.arg("-c").arg(command);
    shell.stdin(Stdio::null());
    shell.stdout(Stdio::piped());
    shell.stderr(Stdio::inherit());
    if let Some(dir) = wd {
        shell.current_dir(dir);
    }

    let output = shell
        .output()
        .await
        .map_err(|e| format!("failed to spawn `{}`: {}", command, e))?;

    if !output.status.success() {
        return Err(format!("`{}` exited with {}", command, output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.split('\n').collect();
    if lines.len() < 2 {
        return Err(format!("`{}` produced no output to score", command));
    }
    let raw = lines[lines.len() - 2].trim();
    raw.parse::<f64>()
        .map_err(|_| format!("`{}` final output line \"{}\" is not a number", command, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Params;

    fn echo_task(commands: &[&str]) -> Task {
        Task::new(
            commands.iter().map(|c| c.to_string()).collect(),
            Params::new(),
            None,
            None,
        )
    }

    #[test]
    fn test_task_ids_are_unique_and_monotonic() {
        let a = echo_task(&["echo 1"]);
        let b = echo_task(&["echo 1"]);
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_run_parses_last_line_score() {
        let mut task = echo_task(&["echo 3.25"]);
        task.run().await;
        assert_eq!(task.score, Some(3.25));
        assert!(task.succeeded());
    }

    #[tokio::test]
    async fn test_only_last_command_score_is_kept() {
        let mut task = echo_task(&["echo 1.0", "echo 2.0"]);
        task.run().await;
        assert_eq!(task.score, Some(2.0));
    }

    #[tokio::test]
    async fn test_multi_line_output_scores_final_line() {
        let mut task = echo_task(&["printf 'setup\\n42.5\\n'"]);
        task.run().await;
        assert_eq!(task.score, Some(42.5));
    }

    #[tokio::test]
    async fn test_nonzero_exit_marks_task_errored() {
        let mut task = echo_task(&["exit 3"]);
        task.run().await;
        assert!(task.score.is_none());
        assert!(task.error.as_deref().unwrap_or("").contains("exited"));
    }

    #[tokio::test]
    async fn test_non_numeric_output_marks_task_errored() {
        let mut task = echo_task(&["echo not-a-number"]);
        task.run().await;
        assert!(task.score.is_none());
        assert!(task.error.as_deref().unwrap_or("").contains("not a number"));
    }

    #[tokio::test]
    async fn test_working_directory_is_honoured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut task = Task::new(
            vec!["test \"$(pwd)\" = \"$(cd . && pwd)\" && echo 1".to_string()],
            Params::new(),
            None,
            Some(dir.path().to_path_buf()),
        );
        task.run().await;
        assert_eq!(task.score, Some(1.0));
    }
}
