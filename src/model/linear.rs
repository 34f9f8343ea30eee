//! Linear model implementations: least squares and Huber's robust regression.

use super::Regressor;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};

/// Solves weighted least squares with an unpenalised intercept.
///
/// Rows are scaled by `sqrt(w)` and the system is solved through an SVD, so
/// rank-deficient designs get the minimum-norm solution. `ridge` adds an L2
/// penalty on the slopes only.
fn weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    w: &DVector<f64>,
    ridge: f64,
) -> Result<(DVector<f64>, f64)> {
    let (n, p) = x.shape();
    let extra = if ridge > 0.0 { p } else { 0 };
    let mut a = DMatrix::<f64>::zeros(n + extra, p + 1);
    let mut b = DVector::<f64>::zeros(n + extra);

    for i in 0..n {
        let sw = w[i].max(0.0).sqrt();
        a[(i, 0)] = sw;
        for j in 0..p {
            a[(i, j + 1)] = sw * x[(i, j)];
        }
        b[i] = sw * y[i];
    }
    let penalty = ridge.sqrt();
    for j in 0..extra {
        a[(n + j, j + 1)] = penalty;
    }

    let solution = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|e| ForecastError::InvalidData(format!("least squares solve failed: {}", e)))?;

    let intercept = solution[0];
    let coefficients = solution.rows(1, p).into_owned();
    Ok((coefficients, intercept))
}

fn linear_predict(x: &DMatrix<f64>, coefficients: &DVector<f64>, intercept: f64) -> Result<DVector<f64>> {
    if x.ncols() != coefficients.len() {
        return Err(ForecastError::InvalidData(format!(
            "expected {} features, got {}",
            coefficients.len(),
            x.ncols()
        )));
    }
    Ok(x * coefficients + DVector::from_element(x.nrows(), intercept))
}

/// Ordinary (optionally sample-weighted) least squares with intercept.
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    pub coefficients: Option<DVector<f64>>,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self { Self::default() }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let (coefficients, intercept) = weighted_least_squares(x, y, weights, 0.0)?;
        self.coefficients = Some(coefficients);
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ForecastError::NotFitted)?;
        linear_predict(x, coefficients, self.intercept)
    }
}

/// Huber M-estimator fitted by iteratively reweighted least squares.
///
/// Residuals within `epsilon` robust scales of zero keep full weight; larger
/// ones are down-weighted by `epsilon / |r/scale|`. The scale is re-estimated
/// each iteration from the median absolute residual.
#[derive(Debug, Clone)]
pub struct HuberRegressor {
    pub epsilon: f64,
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub coefficients: Option<DVector<f64>>,
    pub intercept: f64,
}

impl Default for HuberRegressor {
    fn default() -> Self {
        Self { epsilon: 1.35, alpha: 1e-4, max_iter: 100, tol: 1e-8, coefficients: None, intercept: 0.0 }
    }
}

impl HuberRegressor {
    pub fn new() -> Self { Self::default() }

    fn robust_scale(residuals: &DVector<f64>) -> f64 {
        let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        abs.sort_by(|a, b| a.total_cmp(b));
        let mid = abs.len() / 2;
        let median = if abs.is_empty() {
            0.0
        } else if abs.len() % 2 == 0 {
            (abs[mid - 1] + abs[mid]) / 2.0
        } else {
            abs[mid]
        };
        1.4826 * median
    }
}

impl Regressor for HuberRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let (mut coefficients, mut intercept) = weighted_least_squares(x, y, weights, self.alpha)?;

        for _ in 0..self.max_iter {
            let residuals = y - linear_predict(x, &coefficients, intercept)?;
            let scale = Self::robust_scale(&residuals);
            if scale <= f64::EPSILON {
                break;
            }
            let irls = DVector::from_iterator(
                y.len(),
                residuals.iter().zip(weights.iter()).map(|(r, w)| {
                    let z = (r / scale).abs();
                    if z <= self.epsilon { *w } else { w * self.epsilon / z }
                }),
            );
            let (next_coef, next_intercept) = weighted_least_squares(x, y, &irls, self.alpha)?;
            let shift = (&next_coef - &coefficients).amax().max((next_intercept - intercept).abs());
            coefficients = next_coef;
            intercept = next_intercept;
            if shift < self.tol {
                break;
            }
        }

        self.coefficients = Some(coefficients);
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ForecastError::NotFitted)?;
        linear_predict(x, coefficients, self.intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> (DMatrix<f64>, DVector<f64>) {
        let x = DMatrix::from_fn(n, 1, |i, _| i as f64);
        let y = DVector::from_fn(n, |i, _| 3.0 + 2.0 * i as f64);
        (x, y)
    }

    #[test]
    fn test_ols_recovers_line() {
        let (x, y) = line(20);
        let mut m = LinearRegression::new();
        m.fit(&x, &y, &DVector::from_element(20, 1.0)).unwrap();
        assert!((m.intercept - 3.0).abs() < 1e-8);
        assert!((m.coefficients.as_ref().unwrap()[0] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let m = LinearRegression::new();
        assert_eq!(m.predict(&DMatrix::zeros(1, 1)).unwrap_err(), ForecastError::NotFitted);
    }

    #[test]
    fn test_collinear_features_still_solve() {
        let x = DMatrix::from_fn(10, 2, |i, _| i as f64);
        let y = DVector::from_fn(10, |i, _| 4.0 * i as f64);
        let mut m = LinearRegression::new();
        m.fit(&x, &y, &DVector::from_element(10, 1.0)).unwrap();
        let pred = m.predict(&x).unwrap();
        assert!((pred - y).amax() < 1e-6);
    }

    #[test]
    fn test_huber_resists_outlier() {
        let (x, mut y) = line(30);
        y[29] += 500.0;
        let w = DVector::from_element(30, 1.0);

        let mut ols = LinearRegression::new();
        ols.fit(&x, &y, &w).unwrap();
        let mut huber = HuberRegressor::new();
        huber.fit(&x, &y, &w).unwrap();

        let huber_slope = huber.coefficients.as_ref().unwrap()[0];
        let ols_slope = ols.coefficients.as_ref().unwrap()[0];
        assert!((huber_slope - 2.0).abs() < (ols_slope - 2.0).abs());
        assert!((huber_slope - 2.0).abs() < 0.1);
    }
}
