//! Parallel execution of shell tasks.
//!
//! This module provides the [`Task`] unit of work and the [`WorkerPool`]
//! that executes tasks with bounded concurrency. Completed tasks are
//! published on a shared done stream in completion-arrival order, which
//! the experiment driver routes back into the tree.
mod task;
mod worker;

pub use task::Task;
pub use worker::WorkerPool;
