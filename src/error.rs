//! Error types for the SweepX CLI application.
//!
//! This module defines the `SweepXError` enum covering all error conditions
//! that can occur while loading experiment descriptions, building optimisers,
//! scheduling the experiment tree, and executing shell tasks.
//!
//! It also provides helper methods to construct errors and generate
//! user-friendly messages.
use thiserror::Error;

/// Represents all possible errors in the SweepX application.
///
/// Each variant provides specific context to facilitate debugging and
/// user-friendly reporting.
///
/// # Examples
///
/// ```rust
/// use sweepx_cli::error::{SweepXError, SweepXResult};
///
/// fn example() -> SweepXResult<()> {
///     Err(SweepXError::config("tag \"name\" must be specified"))
/// }
/// ```
///
/// # Exit Codes
///
/// Each error variant maps to an exit code via `SweepXError::exit_code`.
#[derive(Error, Debug)]
pub enum SweepXError {
    /// I/O operation failed during file system access.
    ///
    /// This variant wraps `std::io::Error` and provides context about
    /// file operations that failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to an invalid or missing experiment setting.
    ///
    /// Raised before any task runs; contains a human-readable message
    /// describing the issue.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Experiment file could not be parsed as YAML.
    #[error("Experiment file error [{path}]: {message}")]
    ExperimentFile {
        /// Path of the experiment file
        path: String,
        /// Detailed parse error
        message: String,
    },

    /// A shell task failed: non-zero exit status or unparseable score.
    ///
    /// Task errors are recorded per task and do not stop the run.
    #[error("Task {task_id} failed: {message}")]
    Task {
        /// Unique identifier of the failed task
        task_id: u64,
        /// Description of the failure
        message: String,
    },

    /// Internal scheduler inconsistency, e.g. a score update for a
    /// location that was never proposed.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert config crate error to configuration error
impl From<config::ConfigError> for SweepXError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => SweepXError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => SweepXError::Config { message: msg },
            _ => SweepXError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<serde_yaml_ng::Error> for SweepXError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SweepXError::Config {
            message: format!("YAML parse error: {}", err),
        }
    }
}

impl From<toml::ser::Error> for SweepXError {
    fn from(err: toml::ser::Error) -> Self {
        SweepXError::Config {
            message: format!("TOML serialization error: {}", err),
        }
    }
}

/// Specialized `Result` type for SweepX operations.
pub type SweepXResult<T> = Result<T, SweepXError>;

impl SweepXError {
    /// Create a configuration error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use sweepx_cli::error::SweepXError;
    /// let err = SweepXError::config("invalid setting");
    /// assert_eq!(err.to_string(), "Configuration error: invalid setting");
    /// ```
    pub fn config<S: Into<String>>(message: S) -> Self {
        SweepXError::Config {
            message: message.into(),
        }
    }

    /// Create an experiment file error for the given path and message.
    pub fn experiment_file<S1, S2>(path: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        SweepXError::ExperimentFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a task execution failure error with task ID and reason.
    pub fn task_execution_failed<S: Into<String>>(task_id: u64, reason: S) -> Self {
        SweepXError::Task {
            task_id,
            message: reason.into(),
        }
    }

    /// Create a scheduler error with the given message.
    pub fn scheduler<S: Into<String>>(message: S) -> Self {
        SweepXError::Scheduler(message.into())
    }

    /// Return the corresponding exit code for this error variant.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use sweepx_cli::error::SweepXError;
    /// assert_eq!(SweepXError::config("x").exit_code(), 2);
    /// ```
    pub fn exit_code(&self) -> i32 {
        match self {
            SweepXError::Io(_) => 1,
            SweepXError::Config { .. } => 2,
            SweepXError::ExperimentFile { .. } => 2,
            SweepXError::Task { .. } => 3,
            SweepXError::Scheduler(_) => 4,
            _ => 1,
        }
    }

    /// Return a user-friendly error message with suggested remedies.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use sweepx_cli::error::SweepXError;
    /// let msg = SweepXError::config("missing key").user_friendly_message();
    /// assert!(msg.contains("Configuration error:"));
    /// ```
    pub fn user_friendly_message(&self) -> String {
        match self {
            SweepXError::Io(e) => format!("File operation error: {}", e),
            SweepXError::Config { message } => format!(
                "Configuration error: {}\nHint: run 'sweepx-cli check <file>' to validate an experiment file",
                message
            ),
            SweepXError::ExperimentFile { path, message } => format!(
                "Experiment file error: {}: {}\nHint: check YAML syntax and the experiment schema",
                path, message
            ),
            SweepXError::Task { task_id, message } => {
                format!("Task {} failed: {}", task_id, message)
            }
            SweepXError::Scheduler(msg) => format!("Scheduler error: {}", msg),
            SweepXError::Other(err) => {
                format!("Unknown error: {}\nHint: please report this issue", err)
            }
        }
    }
}
