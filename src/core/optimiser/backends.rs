//! Blocking population-based search backends.
//!
//! Each backend is written in the classic library shape: a synchronous
//! `optimize(objective)` call that drives the objective function itself
//! and only returns when its evaluation budget is spent. The scheduler
//! never calls these directly; [`super::threaded::ThreadedOptimiser`]
//! hosts them on a companion thread and feeds the objective from the
//! worker pool.
//!
//! All backends minimise. Bounds are in the optimiser's internal scale;
//! the caller handles log conversion.
use rand::rngs::StdRng;
use rand::Rng;

/// A blocking derivative-free minimiser.
pub(crate) trait BlockingBackend: Send {
    /// Run the full search, calling `objective` once per evaluation.
    /// Returns the best location found (internal scale).
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64>;
}

/// Shared evaluation budget, best tracking and early-stop handling.
struct EvalBudget {
    remaining: usize,
    stop_fx: Option<f64>,
    best_x: Vec<f64>,
    best_fx: f64,
    stopped: bool,
}

impl EvalBudget {
    fn new(n_iterations: usize, max_score: Option<f64>, d: usize) -> Self {
        Self {
            remaining: n_iterations,
            // Backends minimise the negated score, so the early-stop
            // threshold flips sign too.
            stop_fx: max_score.map(|s| -s),
            best_x: vec![0.0; d],
            best_fx: f64::INFINITY,
            stopped: false,
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0 || self.stopped
    }

    fn eval(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64, x: &[f64]) -> Option<f64> {
        if self.exhausted() {
            return None;
        }
        let fx = objective(x);
        self.remaining -= 1;
        if fx < self.best_fx {
            self.best_fx = fx;
            self.best_x = x.to_vec();
        }
        if let Some(threshold) = self.stop_fx {
            if fx <= threshold {
                self.stopped = true;
            }
        }
        Some(fx)
    }
}

fn clamp_to_bounds(x: &mut [f64], low: &[f64], high: &[f64]) {
    for i in 0..x.len() {
        x[i] = x[i].clamp(low[i], high[i]);
    }
}

fn random_point(rng: &mut StdRng, low: &[f64], high: &[f64]) -> Vec<f64> {
    low.iter()
        .zip(high)
        .map(|(lo, hi)| rng.random_range(*lo..=*hi))
        .collect()
}

/// Particle swarm optimisation with inertia and cognitive/social pulls.
pub(crate) struct ParticleSwarm {
    low: Vec<f64>,
    high: Vec<f64>,
    n_iterations: usize,
    max_score: Option<f64>,
    rng: StdRng,
    /// Cognitive weight; zero turns the swarm into Many Optimising
    /// Liaisons, which only follows the swarm best.
    cognitive: f64,
}

impl ParticleSwarm {
    pub(crate) fn new(
        low: Vec<f64>,
        high: Vec<f64>,
        n_iterations: usize,
        max_score: Option<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            low,
            high,
            n_iterations,
            max_score,
            rng,
            cognitive: 1.49445,
        }
    }

    /// The simplified swarm variant without particle-own-best attraction.
    pub(crate) fn many_optimising_liaisons(
        low: Vec<f64>,
        high: Vec<f64>,
        n_iterations: usize,
        max_score: Option<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            cognitive: 0.0,
            ..Self::new(low, high, n_iterations, max_score, rng)
        }
    }
}

impl BlockingBackend for ParticleSwarm {
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64> {
        let d = self.low.len();
        let mut budget = EvalBudget::new(self.n_iterations, self.max_score, d);
        let swarm_size = (10 + 2 * d).min(self.n_iterations.max(1));
        let inertia = 0.729;
        let social = 1.49445;

        let mut positions: Vec<Vec<f64>> = (0..swarm_size)
            .map(|_| random_point(&mut self.rng, &self.low, &self.high))
            .collect();
        let mut velocities: Vec<Vec<f64>> = (0..swarm_size)
            .map(|_| {
                (0..d)
                    .map(|i| {
                        let range = self.high[i] - self.low[i];
                        self.rng.random_range(-range..=range) * 0.5
                    })
                    .collect()
            })
            .collect();
        let mut personal_best = positions.clone();
        let mut personal_best_fx = vec![f64::INFINITY; swarm_size];
        let mut swarm_best = positions[0].clone();
        let mut swarm_best_fx = f64::INFINITY;

        'outer: loop {
            for p in 0..swarm_size {
                let Some(fx) = budget.eval(objective, &positions[p]) else {
                    break 'outer;
                };
                if fx < personal_best_fx[p] {
                    personal_best_fx[p] = fx;
                    personal_best[p] = positions[p].clone();
                }
                if fx < swarm_best_fx {
                    swarm_best_fx = fx;
                    swarm_best = positions[p].clone();
                }
            }
            for p in 0..swarm_size {
                for i in 0..d {
                    let r1: f64 = self.rng.random_range(0.0..=1.0);
                    let r2: f64 = self.rng.random_range(0.0..=1.0);
                    velocities[p][i] = inertia * velocities[p][i]
                        + self.cognitive * r1 * (personal_best[p][i] - positions[p][i])
                        + social * r2 * (swarm_best[i] - positions[p][i]);
                    positions[p][i] += velocities[p][i];
                }
                clamp_to_bounds(&mut positions[p], &self.low, &self.high);
            }
        }
        budget.best_x
    }
}

/// Classic rand/1/bin differential evolution.
pub(crate) struct DifferentialEvolution {
    low: Vec<f64>,
    high: Vec<f64>,
    n_iterations: usize,
    max_score: Option<f64>,
    rng: StdRng,
}

impl DifferentialEvolution {
    pub(crate) fn new(
        low: Vec<f64>,
        high: Vec<f64>,
        n_iterations: usize,
        max_score: Option<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            low,
            high,
            n_iterations,
            max_score,
            rng,
        }
    }
}

impl BlockingBackend for DifferentialEvolution {
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64> {
        let d = self.low.len();
        let mut budget = EvalBudget::new(self.n_iterations, self.max_score, d);
        let pop_size = (5 * d).clamp(4, self.n_iterations.max(4));
        let weight = 0.5;
        let crossover = 0.9;

        let mut population: Vec<Vec<f64>> = (0..pop_size)
            .map(|_| random_point(&mut self.rng, &self.low, &self.high))
            .collect();
        let mut fitness = vec![f64::INFINITY; pop_size];
        for (member, fit) in population.iter().zip(fitness.iter_mut()) {
            match budget.eval(objective, member) {
                Some(fx) => *fit = fx,
                None => return budget.best_x,
            }
        }

        while !budget.exhausted() {
            for target in 0..pop_size {
                // Three distinct donors, none equal to the target.
                let mut donors = [0usize; 3];
                for slot in 0..3 {
                    loop {
                        let candidate = self.rng.random_range(0..pop_size);
                        if candidate != target && !donors[..slot].contains(&candidate) {
                            donors[slot] = candidate;
                            break;
                        }
                    }
                }
                let forced = self.rng.random_range(0..d);
                let mut trial = population[target].clone();
                for i in 0..d {
                    if i == forced || self.rng.random_range(0.0..=1.0) < crossover {
                        trial[i] = population[donors[0]][i]
                            + weight * (population[donors[1]][i] - population[donors[2]][i]);
                    }
                }
                clamp_to_bounds(&mut trial, &self.low, &self.high);

                let Some(fx) = budget.eval(objective, &trial) else {
                    return budget.best_x;
                };
                if fx <= fitness[target] {
                    fitness[target] = fx;
                    population[target] = trial;
                }
            }
        }
        budget.best_x
    }
}

/// Coordinate pattern search with step halving.
pub(crate) struct PatternSearch {
    low: Vec<f64>,
    high: Vec<f64>,
    n_iterations: usize,
    max_score: Option<f64>,
    rng: StdRng,
}

impl PatternSearch {
    pub(crate) fn new(
        low: Vec<f64>,
        high: Vec<f64>,
        n_iterations: usize,
        max_score: Option<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            low,
            high,
            n_iterations,
            max_score,
            rng,
        }
    }
}

impl BlockingBackend for PatternSearch {
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64> {
        let d = self.low.len();
        let mut budget = EvalBudget::new(self.n_iterations, self.max_score, d);
        let mut x = random_point(&mut self.rng, &self.low, &self.high);
        let mut steps: Vec<f64> = self
            .low
            .iter()
            .zip(&self.high)
            .map(|(lo, hi)| (hi - lo) / 4.0)
            .collect();

        let Some(mut fx) = budget.eval(objective, &x) else {
            return budget.best_x;
        };

        while !budget.exhausted() {
            let mut improved = false;
            for i in 0..d {
                for direction in [1.0, -1.0] {
                    let mut candidate = x.clone();
                    candidate[i] += direction * steps[i];
                    clamp_to_bounds(&mut candidate, &self.low, &self.high);
                    let Some(fc) = budget.eval(objective, &candidate) else {
                        return budget.best_x;
                    };
                    if fc < fx {
                        fx = fc;
                        x = candidate;
                        improved = true;
                        break;
                    }
                }
            }
            if !improved {
                for step in &mut steps {
                    *step *= 0.5;
                }
            }
        }
        budget.best_x
    }
}

/// Local unimodal sampling with exponentially shrinking radius.
pub(crate) struct LocalUnimodalSampling {
    low: Vec<f64>,
    high: Vec<f64>,
    n_iterations: usize,
    max_score: Option<f64>,
    rng: StdRng,
}

impl LocalUnimodalSampling {
    pub(crate) fn new(
        low: Vec<f64>,
        high: Vec<f64>,
        n_iterations: usize,
        max_score: Option<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            low,
            high,
            n_iterations,
            max_score,
            rng,
        }
    }
}

impl BlockingBackend for LocalUnimodalSampling {
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64> {
        let d = self.low.len();
        let mut budget = EvalBudget::new(self.n_iterations, self.max_score, d);
        let mut x = random_point(&mut self.rng, &self.low, &self.high);
        let mut radius: Vec<f64> = self.low.iter().zip(&self.high).map(|(lo, hi)| hi - lo).collect();
        // Standard decrease rate for gamma = 3.
        let shrink = 0.5f64.powf(1.0 / (3.0 * d as f64));

        let Some(mut fx) = budget.eval(objective, &x) else {
            return budget.best_x;
        };

        while !budget.exhausted() {
            let mut candidate: Vec<f64> = x
                .iter()
                .zip(&radius)
                .map(|(xi, r)| xi + self.rng.random_range(-r..=*r))
                .collect();
            clamp_to_bounds(&mut candidate, &self.low, &self.high);
            let Some(fc) = budget.eval(objective, &candidate) else {
                break;
            };
            if fc < fx {
                fx = fc;
                x = candidate;
            } else {
                for r in &mut radius {
                    *r *= shrink;
                }
            }
        }
        budget.best_x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    fn run_backend(mut backend: impl BlockingBackend, counter: &mut usize) -> Vec<f64> {
        let mut objective = |x: &[f64]| {
            *counter += 1;
            sphere(x)
        };
        backend.optimize(&mut objective)
    }

    #[test]
    fn test_particle_swarm_respects_budget_and_improves() {
        let rng = StdRng::seed_from_u64(7);
        let backend = ParticleSwarm::new(vec![-5.0, -5.0], vec![5.0, 5.0], 200, None, rng);
        let mut evals = 0;
        let best = run_backend(backend, &mut evals);
        assert_eq!(evals, 200);
        assert!(sphere(&best) < 1.0, "best {:?} not near origin", best);
    }

    #[test]
    fn test_many_optimising_liaisons_runs_within_budget() {
        let rng = StdRng::seed_from_u64(11);
        let backend =
            ParticleSwarm::many_optimising_liaisons(vec![-5.0], vec![5.0], 80, None, rng);
        let mut evals = 0;
        let best = run_backend(backend, &mut evals);
        assert_eq!(evals, 80);
        assert!(best[0].abs() < 1.0);
    }

    #[test]
    fn test_differential_evolution_converges_on_sphere() {
        let rng = StdRng::seed_from_u64(13);
        let backend = DifferentialEvolution::new(vec![-5.0, -5.0], vec![5.0, 5.0], 300, None, rng);
        let mut evals = 0;
        let best = run_backend(backend, &mut evals);
        assert_eq!(evals, 300);
        assert!(sphere(&best) < 1.0);
    }

    #[test]
    fn test_pattern_search_stays_in_bounds() {
        let rng = StdRng::seed_from_u64(17);
        let backend = PatternSearch::new(vec![1.0], vec![3.0], 60, None, rng);
        let mut evals = 0;
        let best = run_backend(backend, &mut evals);
        assert_eq!(evals, 60);
        assert!((1.0..=3.0).contains(&best[0]));
        // Minimum of the sphere inside [1, 3] sits on the lower bound.
        assert!((best[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_local_unimodal_sampling_converges() {
        let rng = StdRng::seed_from_u64(19);
        let backend = LocalUnimodalSampling::new(vec![-4.0], vec![4.0], 120, None, rng);
        let mut evals = 0;
        let best = run_backend(backend, &mut evals);
        assert_eq!(evals, 120);
        assert!(best[0].abs() < 0.5);
    }

    #[test]
    fn test_max_score_stops_early() {
        let rng = StdRng::seed_from_u64(23);
        // Maximised score is -sphere(x); every point scores <= 0, so a
        // threshold of -100 triggers on the first evaluation.
        let mut backend =
            LocalUnimodalSampling::new(vec![-1.0], vec![1.0], 500, Some(-100.0), rng);
        let mut evals = 0;
        let mut objective = |x: &[f64]| {
            evals += 1;
            sphere(x)
        };
        backend.optimize(&mut objective);
        assert_eq!(evals, 1);
    }
}
