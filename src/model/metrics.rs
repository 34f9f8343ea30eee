//! Goodness-of-fit metrics reported for a forecast run.

use serde::{Deserialize, Serialize};

/// The metrics bundle persisted alongside a run's configuration.
///
/// Field names on the wire match the labels analysts see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "R^2 (Train)", default, skip_serializing_if = "Option::is_none")]
    pub r2_train: Option<f64>,
    #[serde(rename = "R^2 (Test)", default, skip_serializing_if = "Option::is_none")]
    pub r2_test: Option<f64>,
    #[serde(rename = "RMSE", default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(rename = "MAE", default, skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    #[serde(rename = "SMAPE", default, skip_serializing_if = "Option::is_none")]
    pub smape: Option<f64>,
}

/// One scored test row. `error` is `actual - prediction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRow {
    pub prediction: f64,
    pub actual: f64,
    pub error: f64,
    pub smape: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub rows: Vec<TestRow>,
    pub metrics: Metrics,
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2))).sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()))
}

/// Signed symmetric percentage error of a single pair: `2(a-p)/(p+a) * 100`.
/// Identical values score 0 even when both are zero.
pub fn percentage_error(actual: f64, predicted: f64) -> f64 {
    if actual == predicted {
        return 0.0;
    }
    2.0 * (actual - predicted) / (predicted + actual) * 100.0
}

pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(&a, &p)| percentage_error(a, p).abs()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Scores `predicted` against `actual` row by row and in aggregate.
/// Error metrics are rounded to two decimals. R² is reported at full
/// precision, as the estimator's own score is, so it is not rounded here.
pub fn score(actual: &[f64], predicted: &[f64]) -> TestReport {
    let rows = actual
        .iter()
        .zip(predicted)
        .map(|(&a, &p)| {
            let prediction = round2(p);
            let actual = round2(a);
            TestRow {
                prediction,
                actual,
                error: actual - prediction,
                smape: round2(percentage_error(a, p)),
            }
        })
        .collect();

    let metrics = Metrics {
        r2_test: Some(r2_score(actual, predicted)),
        rmse: Some(round2(rmse(actual, predicted))),
        mae: Some(round2(mae(actual, predicted))),
        smape: Some(round2(smape(actual, predicted))),
        ..Default::default()
    };
    TestReport { rows, metrics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction_scores() {
        let y = [10.0, 20.0, 30.0, 0.0];
        let report = score(&y, &y);
        assert_eq!(report.metrics.smape, Some(0.0));
        assert_eq!(report.metrics.rmse, Some(0.0));
        assert_eq!(report.metrics.mae, Some(0.0));
        assert_eq!(report.metrics.r2_test, Some(1.0));
        assert!(report.rows.iter().all(|r| r.error == 0.0));
    }

    #[test]
    fn test_error_metrics_rounded() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 190.0];
        let report = score(&actual, &predicted);
        assert_eq!(report.metrics.rmse, Some(10.0));
        assert_eq!(report.metrics.mae, Some(10.0));
        // |2*-10/210|*100 = 9.5238, |2*10/390|*100 = 5.1282 -> mean 7.326
        assert_eq!(report.metrics.smape, Some(7.33));
        assert_eq!(report.rows[0].error, -10.0);
        assert_eq!(report.rows[0].smape, -9.52);
    }

    #[test]
    fn test_r2_test_keeps_full_precision() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [1.1, 1.9, 3.2, 3.9];
        let report = score(&actual, &predicted);
        let r2 = report.metrics.r2_test.unwrap();
        // 1 - 0.07 / 5 = 0.986
        assert!((r2 - 0.986).abs() < 1e-12);
        assert_ne!(r2, round2(r2));
    }

    #[test]
    fn test_r2_of_mean_predictor_is_zero() {
        let actual = [1.0, 2.0, 3.0];
        assert!((r2_score(&actual, &[2.0, 2.0, 2.0])).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_wire_names() {
        let m = Metrics { r2_train: Some(0.5), smape: Some(1.25), ..Default::default() };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["R^2 (Train)"], 0.5);
        assert_eq!(json["SMAPE"], 1.25);
        assert!(json.get("RMSE").is_none());
    }
}
