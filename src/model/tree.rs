//! CART regression tree with sample weights.

use super::Regressor;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};

/// Decision tree node
#[derive(Debug, Clone)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_row(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right } => {
                    node = if x[(row, *feature_idx)] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Weighted first and second moments of a set of targets.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    w: f64,
    wy: f64,
    wyy: f64,
}

impl Moments {
    fn add(&mut self, w: f64, y: f64) {
        self.w += w;
        self.wy += w * y;
        self.wyy += w * y * y;
    }

    fn minus(&self, other: &Moments) -> Moments {
        Moments { w: self.w - other.w, wy: self.wy - other.wy, wyy: self.wyy - other.wyy }
    }

    /// Weighted sum of squared deviations from the weighted mean.
    fn sse(&self) -> f64 {
        if self.w <= 0.0 { 0.0 } else { (self.wyy - self.wy * self.wy / self.w).max(0.0) }
    }

    fn mean(&self) -> f64 {
        if self.w <= 0.0 { 0.0 } else { self.wy / self.w }
    }
}

/// Regression tree grown greedily on weighted squared error.
#[derive(Debug, Clone)]
pub struct DecisionTreeRegressor {
    root: Option<TreeNode>,
    /// Maximum depth (unbounded when `None`)
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self { root: None, max_depth: None, min_samples_split: 2, min_samples_leaf: 1 }
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self { Self::default() }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    fn build_tree(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        w: &DVector<f64>,
        indices: Vec<usize>,
        depth: usize,
    ) -> TreeNode {
        let mut total = Moments::default();
        for &i in &indices {
            total.add(w[i], y[i]);
        }
        let leaf = TreeNode::Leaf { value: total.mean(), n_samples: indices.len() };

        let should_stop = indices.len() < self.min_samples_split
            || self.max_depth.map_or(false, |d| depth >= d)
            || total.sse() <= 1e-12 * total.w.max(1.0);
        if should_stop {
            return leaf;
        }

        let Some((feature_idx, threshold)) = self.find_best_split(x, y, w, &indices, &total) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| x[(i, feature_idx)] <= threshold);

        TreeNode::Split {
            feature_idx,
            threshold,
            left: Box::new(self.build_tree(x, y, w, left, depth + 1)),
            right: Box::new(self.build_tree(x, y, w, right, depth + 1)),
        }
    }

    /// Scans every feature with prefix moments over the sorted rows and
    /// returns the split with the lowest combined child error.
    fn find_best_split(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        w: &DVector<f64>,
        indices: &[usize],
        total: &Moments,
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let parent_sse = total.sse();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature_idx in 0..x.ncols() {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| x[(a, feature_idx)].total_cmp(&x[(b, feature_idx)]));

            let mut left = Moments::default();
            for k in 1..n {
                let prev = sorted[k - 1];
                left.add(w[prev], y[prev]);

                let (lo, hi) = (x[(prev, feature_idx)], x[(sorted[k], feature_idx)]);
                if lo == hi || k < self.min_samples_leaf || n - k < self.min_samples_leaf {
                    continue;
                }
                let right = total.minus(&left);
                let child_sse = left.sse() + right.sse();
                if child_sse < parent_sse - 1e-12 && best.map_or(true, |(_, _, s)| child_sse < s) {
                    best = Some((feature_idx, (lo + hi) / 2.0, child_sse));
                }
            }
        }

        best.map(|(feature_idx, threshold, _)| (feature_idx, threshold))
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let indices: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(ForecastError::InsufficientData("no rows with positive weight".into()));
        }
        self.root = Some(self.build_tree(x, y, weights, indices, 0));
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let root = self.root.as_ref().ok_or(ForecastError::NotFitted)?;
        Ok(DVector::from_fn(x.nrows(), |row, _| root.predict_row(x, row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_function_is_learned_exactly() {
        let x = DMatrix::from_fn(10, 1, |i, _| i as f64);
        let y = DVector::from_fn(10, |i, _| if i < 5 { 1.0 } else { 7.0 });
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y, &DVector::from_element(10, 1.0)).unwrap();

        assert_eq!(tree.depth(), 1);
        let pred = tree.predict(&DMatrix::from_row_slice(2, 1, &[2.0, 8.5])).unwrap();
        assert_eq!(pred.as_slice(), &[1.0, 7.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = DMatrix::from_fn(32, 1, |i, _| i as f64);
        let y = DVector::from_fn(32, |i, _| (i * i) as f64);
        let mut tree = DecisionTreeRegressor::new().with_max_depth(2);
        tree.fit(&x, &y, &DVector::from_element(32, 1.0)).unwrap();
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_zero_weight_rows_are_ignored() {
        let x = DMatrix::from_fn(4, 1, |i, _| i as f64);
        let y = DVector::from_row_slice(&[1.0, 1.0, 1.0, 100.0]);
        let w = DVector::from_row_slice(&[1.0, 1.0, 1.0, 0.0]);
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y, &w).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert!(pred.iter().all(|&p| p == 1.0));
    }
}
