//! Tree ensembles: bagged random forest and least-squares gradient boosting.

use super::tree::DecisionTreeRegressor;
use super::Regressor;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Bootstrap-aggregated regression trees.
///
/// Each tree sees a bootstrap resample expressed as integer multiplicities
/// folded into the sample weights, so the caller's weights are respected.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    trees: Vec<DecisionTreeRegressor>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub random_state: u64,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self { trees: Vec::new(), n_estimators: 100, max_depth: None, min_samples_leaf: 1, random_state: 42 }
    }
}

impl RandomForestRegressor {
    pub fn new() -> Self { Self::default() }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn n_trees(&self) -> usize { self.trees.len() }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(ForecastError::InsufficientData("cannot fit a forest on zero rows".into()));
        }

        let base_seed = self.random_state;
        let mut template = DecisionTreeRegressor::new().with_min_samples_leaf(self.min_samples_leaf);
        template.max_depth = self.max_depth;

        let trees: Result<Vec<DecisionTreeRegressor>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let mut counts = vec![0.0; n];
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1.0;
                }
                let sample_weights = DVector::from_fn(n, |i, _| counts[i] * weights[i]);
                // A resample that drew only zero-weight rows falls back to the full sample.
                let sample_weights = if sample_weights.iter().any(|&w| w > 0.0) {
                    sample_weights
                } else {
                    weights.clone()
                };

                let mut tree = template.clone();
                tree.fit(x, y, &sample_weights)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        if self.trees.is_empty() {
            return Err(ForecastError::NotFitted);
        }
        let predictions: Vec<DVector<f64>> =
            self.trees.par_iter().map(|t| t.predict(x)).collect::<Result<_>>()?;

        let mut sum = DVector::<f64>::zeros(x.nrows());
        for p in &predictions {
            sum += p;
        }
        Ok(sum / self.trees.len() as f64)
    }
}

/// Gradient boosting on squared loss with shallow regression trees.
#[derive(Debug, Clone)]
pub struct GradientBoostingRegressor {
    init: Option<f64>,
    stages: Vec<DecisionTreeRegressor>,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self { init: None, stages: Vec::new(), n_estimators: 100, learning_rate: 0.1, max_depth: 3 }
    }
}

impl GradientBoostingRegressor {
    pub fn new() -> Self { Self::default() }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let total_weight: f64 = weights.iter().sum();
        if x.nrows() == 0 || total_weight <= 0.0 {
            return Err(ForecastError::InsufficientData("no rows with positive weight".into()));
        }

        let init = y.dot(weights) / total_weight;
        let mut current = DVector::from_element(y.len(), init);
        let mut stages = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let residuals = y - &current;
            let mut tree = DecisionTreeRegressor::new().with_max_depth(self.max_depth);
            tree.fit(x, &residuals, weights)?;
            current += tree.predict(x)? * self.learning_rate;
            stages.push(tree);
        }

        self.init = Some(init);
        self.stages = stages;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let init = self.init.ok_or(ForecastError::NotFitted)?;
        let mut out = DVector::from_element(x.nrows(), init);
        for tree in &self.stages {
            out += tree.predict(x)? * self.learning_rate;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(n: usize) -> (DMatrix<f64>, DVector<f64>) {
        let x = DMatrix::from_fn(n, 1, |i, _| i as f64 / 10.0);
        let y = DVector::from_fn(n, |i, _| {
            let v = i as f64 / 10.0;
            v * v
        });
        (x, y)
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let (x, y) = quadratic(40);
        let w = DVector::from_element(40, 1.0);
        let mut a = RandomForestRegressor::new().with_n_estimators(10).with_random_state(7);
        let mut b = RandomForestRegressor::new().with_n_estimators(10).with_random_state(7);
        a.fit(&x, &y, &w).unwrap();
        b.fit(&x, &y, &w).unwrap();
        assert_eq!(a.n_trees(), 10);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_forest_tracks_training_curve() {
        let (x, y) = quadratic(40);
        let mut forest = RandomForestRegressor::new().with_n_estimators(20);
        forest.fit(&x, &y, &DVector::from_element(40, 1.0)).unwrap();
        let pred = forest.predict(&x).unwrap();
        let max_err = (pred - &y).amax();
        assert!(max_err < 2.0, "max error {}", max_err);
    }

    #[test]
    fn test_forest_trees_respect_depth_limit() {
        let (x, y) = quadratic(40);
        let mut forest = RandomForestRegressor::new().with_n_estimators(8).with_max_depth(2);
        forest.fit(&x, &y, &DVector::from_element(40, 1.0)).unwrap();
        assert_eq!(forest.n_trees(), 8);
        assert!(forest.trees.iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_boosting_reduces_training_error() {
        let (x, y) = quadratic(40);
        let w = DVector::from_element(40, 1.0);
        let mean = y.mean();
        let baseline: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();

        let mut gb = GradientBoostingRegressor::new();
        gb.fit(&x, &y, &w).unwrap();
        let pred = gb.predict(&x).unwrap();
        let sse: f64 = (pred - &y).iter().map(|r| r * r).sum();
        assert!(sse < baseline * 0.01);
    }

    #[test]
    fn test_unfitted_ensembles_fail() {
        let x = DMatrix::zeros(1, 1);
        assert_eq!(RandomForestRegressor::new().predict(&x).unwrap_err(), ForecastError::NotFitted);
        assert_eq!(GradientBoostingRegressor::new().predict(&x).unwrap_err(), ForecastError::NotFitted);
    }
}
