//! model/mod.rs
//! The regression backend: a closed set of algorithms behind one contract.

pub mod ensemble;
pub mod linear;
pub mod metrics;
pub mod neural;
pub mod tree;

use crate::data::Table;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use ensemble::{GradientBoostingRegressor, RandomForestRegressor};
pub use linear::{HuberRegressor, LinearRegression};
pub use metrics::{Metrics, TestReport, TestRow};
pub use neural::{MLPConfig, MLPRegressor};
pub use tree::DecisionTreeRegressor;

/// Fit/predict contract shared by every algorithm. Weights are always
/// supplied; unweighted fits pass ones.
pub trait Regressor: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()>;
    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "OLS")]
    Ols,
    #[serde(rename = "WLS")]
    Wls,
    #[serde(rename = "Robust Regression")]
    RobustRegression,
    #[serde(rename = "Decision Tree")]
    DecisionTree,
    #[serde(rename = "Random Forest")]
    RandomForest,
    #[serde(rename = "Gradient Boost")]
    GradientBoost,
    #[serde(rename = "Feedforward NN")]
    FeedforwardNn,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Ols,
        Algorithm::Wls,
        Algorithm::RobustRegression,
        Algorithm::DecisionTree,
        Algorithm::RandomForest,
        Algorithm::GradientBoost,
        Algorithm::FeedforwardNn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Ols => "OLS",
            Algorithm::Wls => "WLS",
            Algorithm::RobustRegression => "Robust Regression",
            Algorithm::DecisionTree => "Decision Tree",
            Algorithm::RandomForest => "Random Forest",
            Algorithm::GradientBoost => "Gradient Boost",
            Algorithm::FeedforwardNn => "Feedforward NN",
        }
    }

    /// A fresh, unfitted model for this algorithm.
    pub fn build(&self, seed: u64) -> Box<dyn Regressor> {
        match self {
            Algorithm::Ols | Algorithm::Wls => Box::new(LinearRegression::new()),
            Algorithm::RobustRegression => Box::new(HuberRegressor::new()),
            Algorithm::DecisionTree => Box::new(DecisionTreeRegressor::new()),
            Algorithm::RandomForest => Box::new(RandomForestRegressor::new().with_random_state(seed)),
            Algorithm::GradientBoost => Box::new(GradientBoostingRegressor::new()),
            Algorithm::FeedforwardNn => {
                Box::new(MLPRegressor::new(MLPConfig { random_state: seed, ..MLPConfig::default() }))
            }
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s.trim())
            .ok_or_else(|| ForecastError::UnknownAlgorithm(s.to_string()))
    }
}

/// Rank weighting of training rows by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleOrder {
    /// Weights `1..=n`: recent rows count most.
    #[serde(rename = "ASC")]
    Ascending,
    /// Weights `n..=1`.
    #[serde(rename = "DESC")]
    Descending,
}

impl SampleOrder {
    pub fn weights(&self, n: usize) -> DVector<f64> {
        match self {
            SampleOrder::Ascending => DVector::from_fn(n, |i, _| (i + 1) as f64),
            SampleOrder::Descending => DVector::from_fn(n, |i, _| (n - i) as f64),
        }
    }
}

impl FromStr for SampleOrder {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ASC" => Ok(SampleOrder::Ascending),
            "DESC" => Ok(SampleOrder::Descending),
            other => Err(ForecastError::InvalidParameter {
                node: "Regression".into(),
                message: format!("sample order must be ASC or DESC, got '{}'", other),
            }),
        }
    }
}

/// Builds the `rows × columns` design matrix from the named table columns.
pub fn design_matrix<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<DMatrix<f64>> {
    let cols: Vec<&[f64]> = columns
        .iter()
        .map(|c| table.require_column(c.as_ref()))
        .collect::<Result<_>>()?;
    Ok(DMatrix::from_fn(table.len(), cols.len(), |i, j| cols[j][i]))
}

/// One configured algorithm plus the metrics it has accumulated.
#[derive(Debug)]
pub struct RegressionBackend {
    algorithm: Algorithm,
    sample_order: Option<SampleOrder>,
    seed: u64,
    model: Option<Box<dyn Regressor>>,
    metrics: Metrics,
}

impl RegressionBackend {
    pub fn new(algorithm: Algorithm, sample_order: Option<SampleOrder>) -> Self {
        Self { algorithm, sample_order, seed: 42, model: None, metrics: Metrics::default() }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn algorithm(&self) -> Algorithm { self.algorithm }
    pub fn metrics(&self) -> &Metrics { &self.metrics }

    /// Rank weights when a sample order is set, uniform otherwise. WLS
    /// without an order fits exactly like OLS.
    fn training_weights(&self, n: usize) -> DVector<f64> {
        self.sample_order.map_or_else(|| DVector::from_element(n, 1.0), |o| o.weights(n))
    }

    /// Fits a fresh model. With `update_metrics` the training R² is recorded;
    /// a refit passes `false` to keep the metrics of the held-out evaluation.
    pub fn fit(&mut self, features: &DMatrix<f64>, target: &[f64], update_metrics: bool) -> Result<()> {
        if target.is_empty() {
            return Err(ForecastError::InsufficientData("no training rows".into()));
        }
        if features.nrows() != target.len() {
            return Err(ForecastError::LengthMismatch {
                column: "target".into(),
                expected: features.nrows(),
                actual: target.len(),
            });
        }
        if features.iter().chain(target).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidData("training data contains missing values".into()));
        }

        let y = DVector::from_column_slice(target);
        let weights = self.training_weights(target.len());
        let mut model = self.algorithm.build(self.seed);
        model.fit(features, &y, &weights)?;

        if update_metrics {
            let fitted = model.predict(features)?;
            self.metrics.r2_train = Some(metrics::r2_score(target, fitted.as_slice()));
        }
        debug!(algorithm = %self.algorithm, rows = target.len(), features = features.ncols(), "model fitted");
        self.model = Some(model);
        Ok(())
    }

    fn raw_predict(&self, features: &DMatrix<f64>) -> Result<DVector<f64>> {
        self.model.as_ref().ok_or(ForecastError::NotFitted)?.predict(features)
    }

    /// Predictions rounded to two decimals.
    pub fn predict(&self, features: &DMatrix<f64>) -> Result<Vec<f64>> {
        Ok(self.raw_predict(features)?.iter().map(|&v| metrics::round2(v)).collect())
    }

    /// Predicts and scores against `target`, recording the test metrics.
    pub fn score(&mut self, features: &DMatrix<f64>, target: &[f64]) -> Result<TestReport> {
        let predicted = self.raw_predict(features)?;
        if predicted.len() != target.len() {
            return Err(ForecastError::LengthMismatch {
                column: "target".into(),
                expected: predicted.len(),
                actual: target.len(),
            });
        }
        let report = metrics::score(target, predicted.as_slice());
        self.metrics = Metrics { r2_train: self.metrics.r2_train, ..report.metrics.clone() };
        Ok(report)
    }
}

/// Fits every candidate on the same split in parallel and returns each
/// algorithm's metrics, or the error it failed with.
pub fn compare_algorithms(
    candidates: &[Algorithm],
    sample_order: Option<SampleOrder>,
    train: (&DMatrix<f64>, &[f64]),
    test: (&DMatrix<f64>, &[f64]),
    seed: u64,
) -> Vec<(Algorithm, Result<Metrics>)> {
    candidates
        .par_iter()
        .map(|&algorithm| (algorithm, fit_and_score(algorithm, sample_order, train, test, seed)))
        .collect()
}

fn fit_and_score(
    algorithm: Algorithm,
    sample_order: Option<SampleOrder>,
    train: (&DMatrix<f64>, &[f64]),
    test: (&DMatrix<f64>, &[f64]),
    seed: u64,
) -> Result<Metrics> {
    let mut backend = RegressionBackend::new(algorithm, sample_order).with_seed(seed);
    backend.fit(train.0, train.1, true)?;
    backend.score(test.0, test.1)?;
    Ok(backend.metrics().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn linear_data(n: usize) -> (DMatrix<f64>, Vec<f64>) {
        let x = DMatrix::from_fn(n, 1, |i, _| i as f64);
        let y = (0..n).map(|i| 5.0 + 2.0 * i as f64).collect();
        (x, y)
    }

    #[rstest]
    #[case("OLS", Algorithm::Ols)]
    #[case("WLS", Algorithm::Wls)]
    #[case("Robust Regression", Algorithm::RobustRegression)]
    #[case("Decision Tree", Algorithm::DecisionTree)]
    #[case("Random Forest", Algorithm::RandomForest)]
    #[case("Gradient Boost", Algorithm::GradientBoost)]
    #[case("Feedforward NN", Algorithm::FeedforwardNn)]
    fn test_algorithm_names(#[case] name: &str, #[case] expected: Algorithm) {
        assert_eq!(name.parse::<Algorithm>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[test]
    fn test_unknown_algorithm_is_configuration_fault() {
        let err = "SVM".parse::<Algorithm>().unwrap_err();
        assert_eq!(err, ForecastError::UnknownAlgorithm("SVM".into()));
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_rank_weights() {
        assert_eq!(SampleOrder::Ascending.weights(3).as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(SampleOrder::Descending.weights(3).as_slice(), &[3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_fit_score_then_refit_keeps_test_metrics() {
        let (x, y) = linear_data(20);
        let mut backend = RegressionBackend::new(Algorithm::Ols, None);
        backend.fit(&x, &y, true).unwrap();
        assert!((backend.metrics().r2_train.unwrap() - 1.0).abs() < 1e-9);

        let report = backend.score(&x, &y).unwrap();
        assert_eq!(report.metrics.smape, Some(0.0));
        let before = backend.metrics().clone();

        backend.fit(&x, &y, false).unwrap();
        assert_eq!(backend.metrics(), &before);
        assert_eq!(backend.predict(&DMatrix::from_element(1, 1, 25.0)).unwrap(), vec![55.0]);
    }

    #[test]
    fn test_wls_without_order_matches_ols() {
        let x = DMatrix::from_fn(12, 1, |i, _| i as f64);
        let y: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
        let at = DMatrix::from_element(1, 1, 20.0);

        let mut ols = RegressionBackend::new(Algorithm::Ols, None);
        let mut wls = RegressionBackend::new(Algorithm::Wls, None);
        ols.fit(&x, &y, true).unwrap();
        wls.fit(&x, &y, true).unwrap();
        assert_eq!(wls.predict(&at).unwrap(), ols.predict(&at).unwrap());

        let mut ranked = RegressionBackend::new(Algorithm::Wls, Some(SampleOrder::Ascending));
        ranked.fit(&x, &y, true).unwrap();
        assert_ne!(ranked.predict(&at).unwrap(), ols.predict(&at).unwrap());
    }

    #[test]
    fn test_fit_rejects_missing_values() {
        let (x, mut y) = linear_data(5);
        y[2] = f64::NAN;
        let mut backend = RegressionBackend::new(Algorithm::Wls, Some(SampleOrder::Descending));
        assert!(matches!(backend.fit(&x, &y, true), Err(ForecastError::InvalidData(_))));
    }

    #[test]
    fn test_predict_before_fit() {
        let backend = RegressionBackend::new(Algorithm::DecisionTree, None);
        assert_eq!(backend.predict(&DMatrix::zeros(1, 1)).unwrap_err(), ForecastError::NotFitted);
    }

    #[test]
    fn test_compare_algorithms_reports_each_candidate() {
        let (x, y) = linear_data(30);
        let out = compare_algorithms(
            &[Algorithm::Ols, Algorithm::DecisionTree],
            None,
            (&x, &y),
            (&x, &y),
            42,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, Algorithm::Ols);
        assert!(out.iter().all(|(_, m)| m.is_ok()));
    }
}
