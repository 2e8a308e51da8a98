//! Companion-thread wrapper turning blocking optimisers into the
//! pull/push front-end.
//!
//! The blocking backends drive their objective function themselves, but
//! the scheduler cannot answer an objective call synchronously: scores
//! arrive later from the worker pool the scheduler itself drives. The
//! wrapper inverts that control flow. The backend runs on a dedicated
//! companion thread; its objective call publishes the proposed location
//! on a channel and then parks on a score registry until the scheduler
//! pushes the matching score back with [`Optimiser::update`].
//!
//! Per objective call:
//! 1. the companion reserves a registry slot under the canonical key of
//!    the proposed point (slots hold a FIFO, so a backend re-proposing a
//!    point before the previous score arrived does not collide),
//! 2. publishes the point on the location channel and blocks,
//! 3. the scheduler pulls the point via `next_location`, runs a task,
//!    and posts the score under the same key,
//! 4. the companion wakes, pops the score, and hands the negated value
//!    to the backend (backends minimise; the public contract maximises).
//!
//! When the backend returns, the companion pushes its result on the done
//! channel and a `None` sentinel on the location channel.
use super::backends::{
    BlockingBackend, DifferentialEvolution, LocalUnimodalSampling, ParticleSwarm, PatternSearch,
};
use super::bayesian::BayesianOptimisation;
use super::{canonical_key, BestTracker, ContinuousDim, Optimiser, ScaleMap};
use crate::core::params::ParamValue;
use crate::error::SweepXError;
use crate::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Rendezvous between the scheduler (posting scores) and the companion
/// thread (waiting for them), keyed by canonical location.
struct ScoreRegistry {
    state: Mutex<RegistryState>,
    available_update: Condvar,
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<String, Slot>,
    closed: bool,
}

#[derive(Default)]
struct Slot {
    /// Outstanding objective calls waiting under this key
    reserved: usize,
    /// Scores posted but not yet consumed, oldest first
    scores: VecDeque<f64>,
}

impl ScoreRegistry {
    fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            available_update: Condvar::new(),
        }
    }

    /// Companion side: announce an objective call for `key`.
    fn reserve(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.pending.entry(key.to_string()).or_default().reserved += 1;
    }

    /// Scheduler side: deliver a score for `key`. Returns false when the
    /// key was never proposed, in which case the caller drops the score.
    fn post(&self, key: &str, score: f64) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.pending.get_mut(key) {
            Some(slot) => {
                slot.scores.push_back(score);
                self.available_update.notify_all();
                true
            }
            None => false,
        }
    }

    /// Companion side: block until a score for `key` arrives. Returns
    /// `None` once the registry has been closed.
    fn wait_score(&self, key: &str) -> Option<f64> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return None;
            }
            if let Some(slot) = state.pending.get_mut(key) {
                if let Some(score) = slot.scores.pop_front() {
                    slot.reserved -= 1;
                    if slot.reserved == 0 && slot.scores.is_empty() {
                        state.pending.remove(key);
                    }
                    return Some(score);
                }
            }
            state = self.available_update.wait(state).unwrap();
        }
    }

    /// Remove and report every entry left behind after the backend
    /// returned.
    fn drain_orphans(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state.pending.drain().map(|(key, _)| key).collect()
    }

    /// Release any parked objective call; used when the wrapper is
    /// dropped before the backend finished.
    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.available_update.notify_all();
    }
}

/// Pull/push front-end over a blocking backend running on its own thread.
pub struct ThreadedOptimiser {
    loc_rx: mpsc::UnboundedReceiver<Option<Vec<f64>>>,
    done_rx: Option<oneshot::Receiver<Vec<f64>>>,
    registry: Arc<ScoreRegistry>,
    scale: ScaleMap,
    best: BestTracker,
    finished: bool,
    orphans_drained: bool,
    name: String,
}

impl ThreadedOptimiser {
    /// Build the named backend and start its companion thread.
    pub fn spawn(
        name: &str,
        n_iterations: usize,
        max_score: Option<f64>,
        dims: &[ContinuousDim],
    ) -> Result<Self> {
        Self::spawn_seeded(name, n_iterations, max_score, dims, None)
    }

    /// As [`spawn`](Self::spawn), with a fixed RNG seed for deterministic
    /// runs.
    pub fn spawn_seeded(
        name: &str,
        n_iterations: usize,
        max_score: Option<f64>,
        dims: &[ContinuousDim],
        seed: Option<u64>,
    ) -> Result<Self> {
        let scale = ScaleMap::new(dims.iter().map(|d| d.log_scale).collect());
        let low = scale.to_internal(&dims.iter().map(|d| d.low).collect::<Vec<_>>());
        let high = scale.to_internal(&dims.iter().map(|d| d.high).collect::<Vec<_>>());
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut backend: Box<dyn BlockingBackend> = match name {
            "ParticleSwarm" => Box::new(ParticleSwarm::new(low, high, n_iterations, max_score, rng)),
            "ManyOptimisingLiaisons" => Box::new(ParticleSwarm::many_optimising_liaisons(
                low,
                high,
                n_iterations,
                max_score,
                rng,
            )),
            "DifferentialEvolution" => Box::new(DifferentialEvolution::new(
                low,
                high,
                n_iterations,
                max_score,
                rng,
            )),
            "PatternSearch" => {
                Box::new(PatternSearch::new(low, high, n_iterations, max_score, rng))
            }
            "LocalUnimodalSampling" => Box::new(LocalUnimodalSampling::new(
                low,
                high,
                n_iterations,
                max_score,
                rng,
            )),
            "BayesianOptimisation" => Box::new(BayesianOptimisation::new(
                low,
                high,
                n_iterations,
                max_score,
                rng,
            )),
            _ => {
                return Err(SweepXError::config(format!(
                    "Unknown optimiser \"{}\"",
                    name
                )))
            }
        };

        let registry = Arc::new(ScoreRegistry::new());
        let (loc_tx, loc_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let thread_registry = Arc::clone(&registry);
        std::thread::Builder::new()
            .name(format!("optimiser-{}", name))
            .spawn(move || {
                let mut objective = |x: &[f64]| -> f64 {
                    let key = canonical_key(x);
                    thread_registry.reserve(&key);
                    if loc_tx.send(Some(x.to_vec())).is_err() {
                        // Scheduler is gone; feed the backend worst-case
                        // values so it winds down on its own budget.
                        return f64::INFINITY;
                    }
                    match thread_registry.wait_score(&key) {
                        Some(score) => -score,
                        None => f64::INFINITY,
                    }
                };
                let best_internal = backend.optimize(&mut objective);
                let _ = done_tx.send(best_internal);
                let _ = loc_tx.send(None);
            })?;

        Ok(Self {
            loc_rx,
            done_rx: Some(done_rx),
            registry,
            scale,
            best: BestTracker::default(),
            finished: false,
            orphans_drained: false,
            name: name.to_string(),
        })
    }

    fn continuous_components(loc: &[ParamValue]) -> Option<Vec<f64>> {
        loc.iter().map(ParamValue::as_number).collect()
    }
}

#[async_trait]
impl Optimiser for ThreadedOptimiser {
    async fn next_location(&mut self) -> Option<Vec<ParamValue>> {
        if self.finished {
            return None;
        }
        match self.loc_rx.recv().await {
            Some(Some(internal)) => Some(
                self.scale
                    .to_original(&internal)
                    .into_iter()
                    .map(ParamValue::Number)
                    .collect(),
            ),
            Some(None) | None => {
                self.finished = true;
                if let Some(done_rx) = self.done_rx.take() {
                    if let Ok(best_internal) = done_rx.await {
                        log::debug!(
                            "{} backend finished, library best (internal): {:?}",
                            self.name,
                            best_internal
                        );
                    }
                }
                None
            }
        }
    }

    fn update(&mut self, loc: &[ParamValue], score: f64) {
        let Some(user) = Self::continuous_components(loc) else {
            log::warn!(
                "{}: ignoring update with non-numeric location {:?}",
                self.name,
                loc
            );
            return;
        };
        let key = canonical_key(&self.scale.to_internal(&user));
        if !self.registry.post(&key, score) {
            // Never-proposed location: dropped entirely, best tracking
            // included.
            log::warn!(
                "{}: dropping update for never-proposed location {}",
                self.name,
                key
            );
            return;
        }
        self.best.observe(loc, score);
    }

    fn is_done(&mut self) -> bool {
        if self.finished && !self.orphans_drained {
            self.orphans_drained = true;
            for key in self.registry.drain_orphans() {
                log::warn!("{}: orphan score registry entry for {}", self.name, key);
            }
        }
        self.finished
    }

    fn best_location(&self) -> Option<Vec<ParamValue>> {
        self.best.location()
    }

    fn best_score(&self) -> Option<f64> {
        self.best.score()
    }
}

impl Drop for ThreadedOptimiser {
    fn drop(&mut self) {
        // Unpark a still-waiting objective call so the companion thread
        // can run its budget down and exit.
        self.registry.close();
    }
}
