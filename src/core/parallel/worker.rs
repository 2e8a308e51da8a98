//! Worker pool: bounded-concurrency execution of shell tasks.
//!
//! The pool owns one tokio task per worker. Each worker drains its own
//! input queue, runs tasks to completion and publishes them on a shared
//! done channel. Submission picks the first empty queue, falling back to
//! the shortest one, so the balance is best-effort rather than
//! work-stealing.
use super::task::Task;
use crate::error::SweepXError;
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Pool of workers executing shell tasks in parallel.
pub struct WorkerPool {
    inputs: Vec<UnboundedSender<Task>>,
    queue_depths: Vec<Arc<AtomicUsize>>,
    done_tx: Option<UnboundedSender<Task>>,
    done_rx: UnboundedReceiver<Task>,
    handles: Vec<JoinHandle<()>>,
    workers: usize,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one), each with its own input
    /// queue.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let mut inputs = Vec::with_capacity(workers);
        let mut queue_depths = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel();
            let depth = Arc::new(AtomicUsize::new(0));
            handles.push(tokio::spawn(worker_loop(
                Uuid::new_v4(),
                rx,
                Arc::clone(&depth),
                done_tx.clone(),
            )));
            inputs.push(tx);
            queue_depths.push(depth);
        }

        Self {
            inputs,
            queue_depths,
            done_tx: Some(done_tx),
            done_rx,
            handles,
            workers,
        }
    }

    /// Number of workers in the pool.
    pub fn capacity(&self) -> usize {
        self.workers
    }

    /// Enqueue a task on the least loaded worker.
    ///
    /// The first worker with an empty queue wins; otherwise the shortest
    /// queue does, ties broken by worker index.
    pub fn submit(&self, task: Task) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(SweepXError::scheduler(format!(
                "task {} submitted after the pool was ended",
                task.id
            )));
        }

        let mut chosen = 0;
        let mut chosen_depth = usize::MAX;
        for (i, depth) in self.queue_depths.iter().enumerate() {
            let depth = depth.load(Ordering::SeqCst);
            if depth == 0 {
                chosen = i;
                chosen_depth = 0;
                break;
            }
            if depth < chosen_depth {
                chosen = i;
                chosen_depth = depth;
            }
        }

        log::debug!(
            "submitting task {} to worker {} (queue depth {})",
            task.id,
            chosen,
            chosen_depth
        );
        self.queue_depths[chosen].fetch_add(1, Ordering::SeqCst);
        self.inputs[chosen]
            .send(task)
            .map_err(|e| SweepXError::scheduler(format!("worker queue closed: task {}", e.0.id)))
    }

    /// Enqueue a batch of tasks.
    pub fn submit_all(&self, tasks: Vec<Task>) -> Result<()> {
        for task in tasks {
            self.submit(task)?;
        }
        Ok(())
    }

    /// Next completed task, in completion-arrival order.
    ///
    /// Returns `None` once the pool has been ended and every in-flight
    /// task has been emitted.
    pub async fn next_finished(&mut self) -> Option<Task> {
        self.done_rx.recv().await
    }

    /// Signal workers to drain their queues and exit.
    ///
    /// Already running commands finish naturally; the done stream keeps
    /// yielding until every in-flight task has arrived.
    pub fn end(&mut self) {
        self.inputs.clear();
        self.done_tx.take();
    }

    /// Wait for every worker to exit. Call after [`end`](Self::end).
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                log::warn!("worker exited abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    worker_id: Uuid,
    mut input: UnboundedReceiver<Task>,
    depth: Arc<AtomicUsize>,
    done: UnboundedSender<Task>,
) {
    while let Some(mut task) = input.recv().await {
        depth.fetch_sub(1, Ordering::SeqCst);
        log::debug!("worker {} starting task {}", worker_id, task.id);
        task.run().await;
        if done.send(task).is_err() {
            // Pool dropped before draining; nothing left to report to.
            break;
        }
    }
    log::debug!("worker {} drained and exiting", worker_id);
}
