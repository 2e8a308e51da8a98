//! Exhaustive grid enumeration over continuous and categorical axes.
use super::{BestTracker, ContinuousDim, Optimiser, ScaleMap};
use crate::core::params::ParamValue;
use async_trait::async_trait;

/// Enumerates the cross product of per-dimension grids.
///
/// Each continuous dimension is sampled at `grid_res` equally spaced
/// points between its bounds on the internal (possibly log) scale;
/// categorical dimensions contribute their literal values. Iteration is a
/// mixed-radix counter with dimension 0 varying fastest.
pub struct GridSearchOptimiser {
    grid_dims: Vec<Vec<ParamValue>>,
    total: usize,
    proposed: usize,
    updated: usize,
    best: BestTracker,
}

impl GridSearchOptimiser {
    /// Build the grid from continuous axes (sampled at `grid_res` points
    /// each) followed by categorical axes.
    pub fn new(grid_res: usize, dims: &[ContinuousDim], cat_vals: &[Vec<ParamValue>]) -> Self {
        let scale = ScaleMap::new(dims.iter().map(|d| d.log_scale).collect());
        let low = scale.to_internal(&dims.iter().map(|d| d.low).collect::<Vec<_>>());
        let high = scale.to_internal(&dims.iter().map(|d| d.high).collect::<Vec<_>>());

        let mut grid_dims: Vec<Vec<ParamValue>> = Vec::with_capacity(dims.len() + cat_vals.len());
        for (i, dim) in dims.iter().enumerate() {
            let points = linspace(low[i], high[i], grid_res);
            let user_points = if dim.log_scale {
                points.iter().map(|p| p.exp()).collect()
            } else {
                points
            };
            grid_dims.push(user_points.into_iter().map(ParamValue::Number).collect());
        }
        for vals in cat_vals {
            grid_dims.push(vals.clone());
        }

        let total = grid_dims.iter().map(Vec::len).product();
        Self {
            grid_dims,
            total,
            proposed: 0,
            updated: 0,
            best: BestTracker::default(),
        }
    }

}

fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![low];
    }
    let step = (high - low) / (n - 1) as f64;
    (0..n).map(|i| low + step * i as f64).collect()
}

#[async_trait]
impl Optimiser for GridSearchOptimiser {
    async fn next_location(&mut self) -> Option<Vec<ParamValue>> {
        if self.proposed >= self.total {
            return None;
        }
        let mut rest = self.proposed;
        let mut loc = Vec::with_capacity(self.grid_dims.len());
        for dim in &self.grid_dims {
            loc.push(dim[rest % dim.len()].clone());
            rest /= dim.len();
        }
        self.proposed += 1;
        Some(loc)
    }

    fn update(&mut self, loc: &[ParamValue], score: f64) {
        self.best.observe(loc, score);
        self.updated += 1;
    }

    fn is_done(&mut self) -> bool {
        self.updated >= self.total
    }

    fn best_location(&self) -> Option<Vec<ParamValue>> {
        self.best.location()
    }

    fn best_score(&self) -> Option<f64> {
        self.best.score()
    }
}
