//! Blocking Bayesian optimisation backend.
//!
//! A Gaussian process with an RBF kernel over the unit cube, fitted by
//! Cholesky decomposition, with expected improvement as the acquisition
//! function. Like the swarm backends it is written as a synchronous
//! `optimize(objective)` call and hosted on a companion thread.
use super::backends::BlockingBackend;
use rand::rngs::StdRng;
use rand::Rng;

const LENGTH_SCALE: f64 = 0.2;
const CANDIDATES: usize = 256;
const LOCAL_CANDIDATES: usize = 32;

pub(crate) struct BayesianOptimisation {
    low: Vec<f64>,
    high: Vec<f64>,
    n_iterations: usize,
    max_score: Option<f64>,
    rng: StdRng,
}

impl BayesianOptimisation {
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

    fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| {
                let span = self.high[i] - self.low[i];
                if span > 0.0 { (v - self.low[i]) / span } else { 0.0 }
            })
            .collect()
    }

    fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .enumerate()
            .map(|(i, v)| self.low[i] + v * (self.high[i] - self.low[i]))
            .collect()
    }
}

impl BlockingBackend for BayesianOptimisation {
    fn optimize(&mut self, objective: &mut dyn FnMut(&[f64]) -> f64) -> Vec<f64> {
        let d = self.low.len();
        let mut best_x = self.low.clone();
        let mut best_fx = f64::INFINITY;
        let stop_fx = self.max_score.map(|s| -s);

        let mut observed_x: Vec<Vec<f64>> = Vec::new();
        let mut observed_y: Vec<f64> = Vec::new();
        let n_init = (d + 1).max(2).min(self.n_iterations);

        for step in 0..self.n_iterations {
            let unit = if step < n_init {
                (0..d).map(|_| self.rng.random_range(0.0..=1.0)).collect()
            } else {
                let gp = GaussianProcess::fit(&observed_x, &observed_y);
                let incumbent = observed_y
                    .iter()
                    .cloned()
                    .fold(f64::INFINITY, f64::min);
                let best_unit = self.to_unit(&best_x);
                let mut best_candidate: Vec<f64> =
                    (0..d).map(|_| self.rng.random_range(0.0..=1.0)).collect();
                let mut best_ei = f64::NEG_INFINITY;
                for c in 0..CANDIDATES + LOCAL_CANDIDATES {
                    let candidate: Vec<f64> = if c < CANDIDATES {
                        (0..d).map(|_| self.rng.random_range(0.0..=1.0)).collect()
                    } else {
                        // Local perturbations around the incumbent.
                        best_unit
                            .iter()
                            .map(|v| {
                                (v + self.rng.random_range(-0.05..=0.05)).clamp(0.0, 1.0)
                            })
                            .collect()
                    };
                    let ei = gp.expected_improvement(&candidate, incumbent);
                    if ei > best_ei {
                        best_ei = ei;
                        best_candidate = candidate;
                    }
                }
                best_candidate
            };

            let x = self.from_unit(&unit);
            let fx = objective(&x);
            if fx < best_fx {
                best_fx = fx;
                best_x = x.clone();
            }
            observed_x.push(unit);
            // Errored evaluations come back non-finite; clamp so the
            // Cholesky factorisation stays well-conditioned.
            observed_y.push(if fx.is_finite() { fx } else { 1e12 });

            if let Some(threshold) = stop_fx {
                if fx <= threshold {
                    break;
                }
            }
        }
        best_x
    }
}

/// Gaussian process regression on standardised targets.
struct GaussianProcess {
    train_x: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    chol: Vec<Vec<f64>>,
    y_mean: f64,
    y_std: f64,
    noise: f64,
}

impl GaussianProcess {
    fn fit(train_x: &[Vec<f64>], train_y: &[f64]) -> Self {
        let n = train_x.len();
        let y_mean = train_y.iter().sum::<f64>() / n as f64;
        let variance = train_y.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = variance.sqrt().max(1e-9);
        let y_norm: Vec<f64> = train_y.iter().map(|y| (y - y_mean) / y_std).collect();

        let mut noise = 1e-6;
        loop {
            let mut kernel = vec![vec![0.0; n]; n];
            for i in 0..n {
                for j in 0..=i {
                    let k = rbf(&train_x[i], &train_x[j]);
                    kernel[i][j] = k;
                    kernel[j][i] = k;
                }
                kernel[i][i] += noise;
            }
            if let Some(chol) = cholesky(&kernel) {
                let z = forward_substitute(&chol, &y_norm);
                let alpha = backward_substitute(&chol, &z);
                return Self {
                    train_x: train_x.to_vec(),
                    alpha,
                    chol,
                    y_mean,
                    y_std,
                    noise,
                };
            }
            // Not positive definite at this jitter level; back off.
            noise *= 10.0;
        }
    }

    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self.train_x.iter().map(|xi| rbf(xi, x)).collect();
        let mu_norm: f64 = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = forward_substitute(&self.chol, &k_star);
        let var = (1.0 + self.noise - v.iter().map(|vi| vi * vi).sum::<f64>()).max(1e-12);
        (self.y_mean + self.y_std * mu_norm, self.y_std * var.sqrt())
    }

    /// Expected improvement below `incumbent` (this GP minimises).
    fn expected_improvement(&self, x: &[f64], incumbent: f64) -> f64 {
        let (mu, sigma) = self.predict(x);
        if sigma <= 0.0 {
            return 0.0;
        }
        let improvement = incumbent - mu;
        let z = improvement / sigma;
        improvement * normal_cdf(z) + sigma * normal_pdf(z)
    }
}

fn rbf(a: &[f64], b: &[f64]) -> f64 {
    let sq: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| ((x - y) / LENGTH_SCALE).powi(2))
        .sum();
    (-0.5 * sq).exp()
}

fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn forward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    x
}

fn backward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in i + 1..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    x
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz & Stegun 7.1.26 rational approximation of the error
/// function; accurate to ~1.5e-7, plenty for an acquisition ranking.
fn normal_cdf(z: f64) -> f64 {
    let x = z / std::f64::consts::SQRT_2;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let erf = 1.0 - poly * (-x * x).exp();
    0.5 * (1.0 + sign * erf)
}
