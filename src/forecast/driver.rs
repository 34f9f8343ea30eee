//! driver.rs
//! Walk-forward forecasting: evaluate the graph on history, split it into
//! train and test windows, fit and score the backend, refit on both windows
//! and then predict the horizon one date at a time, feeding every
//! prediction back into the history.

use super::extrapolation::Extrapolator;
use super::provider::ExperimentOutputs;
use super::variables::{extract_variables, VariableDescriptor};
use crate::analysis::GraphProfile;
use crate::calendar::{date_range, Frequency};
use crate::compute::Evaluator;
use crate::config::ForecastConfig;
use crate::data::{Filter, Table, MISSING, TIME_INDEX};
use crate::error::{ForecastError, Result};
use crate::model::{design_matrix, Metrics, RegressionBackend, TestReport};
use crate::store::{GraphSpec, ModelMethod};
use chrono::NaiveDate;
use nalgebra::DMatrix;
use tracing::{debug, info, info_span, instrument, warn};

/// Format of the human-readable date shown next to each forecast row.
pub const HUMAN_TIME_FORMAT: &str = "%d %b, %Y";

pub fn human_time(date: NaiveDate) -> String {
    date.format(HUMAN_TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Split,
    Fit,
    Refit,
    RollForward,
}

/// One predicted row of the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub time: NaiveDate,
    pub time_index: f64,
    /// Missing when the row's features could not all be computed.
    pub prediction: f64,
    /// Every history column of the appended row, the prediction included.
    pub values: Vec<(String, f64)>,
}

impl ForecastRow {
    pub fn human_time(&self) -> String {
        human_time(self.time)
    }
}

#[derive(Debug, Clone)]
pub struct ForecastOutput {
    /// The horizon rows: variable columns, `TimeIndex` and the predicted target.
    pub predictions: Table,
    pub human_time: Vec<String>,
    /// `(rows, features)` of the refit data.
    pub training_shape: (usize, usize),
    pub metrics: Metrics,
    pub test_report: TestReport,
    pub frequency: Frequency,
}

pub struct WalkForward<'g> {
    graph: &'g GraphSpec,
    config: ForecastConfig,
}

impl<'g> WalkForward<'g> {
    pub fn new(graph: &'g GraphSpec, config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        graph.validate()?;
        Ok(Self { graph, config })
    }

    pub fn config(&self) -> &ForecastConfig { &self.config }

    /// Runs every phase and collects the horizon.
    pub fn run(&self, history: Table, outputs: &mut dyn ExperimentOutputs) -> Result<ForecastOutput> {
        let mut fitted = self.prepare(history)?;
        let rows = fitted.roll_forward(outputs).collect::<Result<Vec<ForecastRow>>>()?;
        info!(rows = rows.len(), "forecast complete");

        Ok(ForecastOutput {
            predictions: fitted.history.tail(rows.len()),
            human_time: rows.iter().map(ForecastRow::human_time).collect(),
            training_shape: fitted.training_shape,
            metrics: fitted.metrics().clone(),
            test_report: fitted.test_report.clone(),
            frequency: fitted.frequency,
        })
    }

    /// Split, Fit and Refit. The returned forecast is ready to roll forward.
    #[instrument(skip_all, fields(rows = history.len()))]
    pub fn prepare(&self, history: Table) -> Result<FittedForecast<'g>> {
        let frequency = Frequency::detect(history.time())?;
        let variables = extract_variables(self.graph)?;
        let mut evaluator = Evaluator::new(self.graph)?;
        if self.config.memoize {
            evaluator = evaluator.with_cache();
        } else {
            let profile = GraphProfile::analyze(self.graph)?;
            if profile.cache_benefit() > 1.0 {
                debug!(
                    uncached = profile.uncached_evaluations,
                    cached = profile.cached_evaluations,
                    "shared nodes are recomputed; enable memoize to cache them"
                );
            }
        }

        // Only the variables and TimeIndex travel forward.
        let mut carried: Vec<&str> = variables.iter().map(|v| v.column.as_str()).collect();
        if history.has_column(TIME_INDEX) {
            carried.push(TIME_INDEX);
        }
        let running = history.select(&carried)?;

        let split_span = info_span!("phase", phase = ?Phase::Split).entered();
        let bundle = evaluator.evaluate(history)?;
        let (algorithm, sample_order) = match bundle.model {
            Some(ModelMethod::Regression { algorithm, sample_order }) => (algorithm, sample_order),
            _ => {
                return Err(ForecastError::InvalidConfig(format!(
                    "'{}' has no regression method attached",
                    bundle.target
                )))
            }
        };
        if bundle.features.is_empty() {
            return Err(ForecastError::InvalidConfig("the graph produces no features".into()));
        }

        let mut columns = bundle.features.clone();
        columns.push(bundle.target.clone());
        let slice = |start: NaiveDate, end: NaiveDate| -> Result<Table> {
            Filter::time_between(start, end).apply(&bundle.data)?.drop_missing(&columns)
        };
        let train = slice(self.config.train.start, self.config.train.end)?;
        let test = slice(self.config.test.start, self.config.test.end)?;
        let full = slice(self.config.train.start, self.config.test.end)?;
        debug!(train = train.len(), test = test.len(), features = bundle.features.len(), "split");
        drop(split_span);

        let mut backend = RegressionBackend::new(algorithm, sample_order).with_seed(self.config.seed);

        let test_report = {
            let _span = info_span!("phase", phase = ?Phase::Fit).entered();
            backend.fit(&design_matrix(&train, &bundle.features)?, train.require_column(&bundle.target)?, true)?;
            if test.is_empty() {
                return Err(ForecastError::InsufficientData("no complete rows in the test window".into()));
            }
            backend.score(&design_matrix(&test, &bundle.features)?, test.require_column(&bundle.target)?)?
        };
        info!(algorithm = %algorithm, metrics = ?backend.metrics(), "model scored");

        {
            let _span = info_span!("phase", phase = ?Phase::Refit).entered();
            backend.fit(&design_matrix(&full, &bundle.features)?, full.require_column(&bundle.target)?, false)?;
        }

        let horizon = date_range(self.config.prediction.start, self.config.prediction.end, frequency);
        Ok(FittedForecast {
            evaluator,
            backend,
            variables,
            target: bundle.target,
            frequency,
            back_window: self.config.back_window,
            horizon,
            training_shape: (full.len(), bundle.features.len()),
            test_report,
            history: running,
        })
    }
}

/// A fitted backend plus the history it extends.
pub struct FittedForecast<'g> {
    evaluator: Evaluator<'g>,
    backend: RegressionBackend,
    variables: Vec<VariableDescriptor>,
    target: String,
    frequency: Frequency,
    back_window: usize,
    horizon: Vec<NaiveDate>,
    training_shape: (usize, usize),
    test_report: TestReport,
    history: Table,
}

impl<'g> FittedForecast<'g> {
    pub fn metrics(&self) -> &Metrics { self.backend.metrics() }
    pub fn test_report(&self) -> &TestReport { &self.test_report }
    pub fn training_shape(&self) -> (usize, usize) { self.training_shape }
    pub fn frequency(&self) -> Frequency { self.frequency }
    pub fn horizon(&self) -> &[NaiveDate] { &self.horizon }
    pub fn variables(&self) -> &[VariableDescriptor] { &self.variables }

    /// Known rows followed by every row predicted so far.
    pub fn history(&self) -> &Table { &self.history }

    /// Steps through the horizon lazily. Each item appends one row to the
    /// history; dropping the iterator stops the forecast there.
    pub fn roll_forward<'a>(&'a mut self, outputs: &'a mut dyn ExperimentOutputs) -> RollForward<'a, 'g> {
        let dates = self.horizon.clone().into_iter();
        RollForward { forecast: self, outputs, dates }
    }

    #[instrument(skip(self, outputs), fields(phase = ?Phase::RollForward))]
    fn step(&mut self, date: NaiveDate, outputs: &mut dyn ExperimentOutputs) -> Result<ForecastRow> {
        let window = Extrapolator::new(&self.variables, self.frequency)
            .with_back_window(self.back_window)
            .build_window(&self.history, date, outputs)?;
        let bundle = self.evaluator.evaluate(window)?;
        let last = bundle
            .data
            .len()
            .checked_sub(1)
            .ok_or_else(|| ForecastError::InsufficientData("empty prediction window".into()))?;

        let x = bundle
            .features
            .iter()
            .map(|f| bundle.data.require_column(f).map(|c| c[last]))
            .collect::<Result<Vec<f64>>>()?;
        let prediction = if x.iter().all(|v| v.is_finite()) {
            let predicted = self.backend.predict(&DMatrix::from_row_slice(1, x.len(), &x))?;
            predicted.first().copied().unwrap_or(MISSING)
        } else {
            warn!(date = %date, "features incomplete; prediction is missing");
            MISSING
        };

        let names: Vec<String> = self.history.column_names().map(str::to_string).collect();
        let values: Vec<(String, f64)> = names
            .into_iter()
            .map(|name| {
                let v = if name == self.target { prediction } else { bundle.data.value_at(date, &name) };
                (name, v)
            })
            .collect();
        let row: Vec<(&str, f64)> = values.iter().map(|(n, v)| (n.as_str(), *v)).collect();
        self.history.push_row(date, &row)?;

        debug!(date = %date, prediction, "predicted");
        Ok(ForecastRow {
            time: date,
            time_index: bundle.data.value_at(date, TIME_INDEX),
            prediction,
            values,
        })
    }
}

pub struct RollForward<'a, 'g> {
    forecast: &'a mut FittedForecast<'g>,
    outputs: &'a mut dyn ExperimentOutputs,
    dates: std::vec::IntoIter<NaiveDate>,
}

impl Iterator for RollForward<'_, '_> {
    type Item = Result<ForecastRow>;

    /// Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let date = self.dates.next()?;
        let result = self.forecast.step(date, &mut *self.outputs);
        if result.is_err() {
            self.dates = Vec::new().into_iter();
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DateWindow;
    use crate::forecast::provider::NoExperiments;
    use chrono::Months;

    fn month(i: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Months::new(i)
    }

    fn config(train: (u32, u32), test: (u32, u32), prediction: (u32, u32)) -> ForecastConfig {
        ForecastConfig::new(
            DateWindow::new(month(train.0), month(train.1)),
            DateWindow::new(month(test.0), month(test.1)),
            DateWindow::new(month(prediction.0), month(prediction.1)),
        )
    }

    fn table(n: u32, columns: &[(&str, &dyn Fn(u32) -> f64)]) -> Table {
        let mut t = Table::new((0..n).map(month).collect())
            .with_column(TIME_INDEX, (0..n).map(f64::from).collect())
            .unwrap();
        for (name, f) in columns {
            t.set_column(*name, (0..n).map(|i| f(i)).collect()).unwrap();
        }
        t
    }

    const REVENUE_GRAPH: &str = r#"{
        "target": {"type": "Dependent Variable", "column": "Revenue", "dependencies": ["model", "features"]},
        "model": {"type": "Modelling", "method": "OLS"},
        "features": {"type": "Merge", "dependencies": ["t", "cube"]},
        "t": {"type": "Independent Variable", "column": "TimeIndex"},
        "cube": {"type": "Transformation", "method": "Power", "parameter": 3, "dependencies": ["t"]}
    }"#;

    #[test]
    fn test_revenue_trend_extends_with_contiguous_time_index() {
        let graph = GraphSpec::from_json(REVENUE_GRAPH).unwrap();
        let history = table(24, &[("Revenue", &|i: u32| 100.0 + 5.0 * i as f64)]);
        let driver = WalkForward::new(&graph, config((0, 17), (18, 23), (24, 29))).unwrap();

        let out = driver.run(history, &mut NoExperiments).unwrap();
        assert_eq!(out.frequency, Frequency::Monthly);
        assert_eq!(out.predictions.len(), 6);
        assert_eq!(out.training_shape, (24, 2));
        assert_eq!(out.human_time[0], "01 Jan, 2022");
        out.predictions.check_time_index().unwrap();
        assert_eq!(out.predictions.column(TIME_INDEX).unwrap()[0], 24.0);

        for (t, p) in out
            .predictions
            .column(TIME_INDEX)
            .unwrap()
            .iter()
            .zip(out.predictions.column("Revenue").unwrap())
        {
            assert!((p - (100.0 + 5.0 * t)).abs() < 0.05, "t={} p={}", t, p);
        }
        assert!(out.metrics.r2_train.unwrap() > 0.999);
        assert_eq!(out.test_report.rows.len(), 6);
    }

    #[test]
    fn test_cagr_zero_growth_repeats_pattern() {
        let graph = GraphSpec::from_json(
            r#"{
                "y": {"type": "Dependent Variable", "column": "Sales", "dependencies": ["ols", "m"]},
                "ols": {"type": "Modelling", "method": "OLS"},
                "m": {"type": "Merge", "dependencies": ["p"]},
                "p": {"type": "Independent Variable", "column": "Price", "dependencies": ["cagr"]},
                "cagr": {"type": "Modelling", "method": "CAGR", "parameter": "2,2"}
            }"#,
        )
        .unwrap();
        let price = |i: u32| if i % 2 == 0 { 9.0 } else { 11.0 };
        let history = table(12, &[("Price", &price), ("Sales", &|i: u32| 2.0 * price(i) + 1.0)]);
        let driver = WalkForward::new(&graph, config((0, 7), (8, 11), (12, 15))).unwrap();

        let out = driver.run(history, &mut NoExperiments).unwrap();
        assert_eq!(out.predictions.column("Price").unwrap(), &[9.0, 11.0, 9.0, 11.0]);
        let sales = out.predictions.column("Sales").unwrap();
        for (s, expected) in sales.iter().zip([19.0, 23.0, 19.0, 23.0]) {
            assert!((s - expected).abs() < 0.01);
        }
    }

    #[test]
    fn test_roll_forward_can_stop_early() {
        let graph = GraphSpec::from_json(REVENUE_GRAPH).unwrap();
        let history = table(24, &[("Revenue", &|i: u32| 100.0 + 5.0 * i as f64)]);
        let driver = WalkForward::new(&graph, config((0, 17), (18, 23), (24, 35))).unwrap();

        let mut fitted = driver.prepare(history).unwrap();
        assert_eq!(fitted.horizon().len(), 12);
        let mut outputs = NoExperiments;
        let first: Vec<ForecastRow> = fitted.roll_forward(&mut outputs).take(2).map(Result::unwrap).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].time_index, 25.0);
        assert_eq!(first[1].human_time(), "01 Feb, 2022");
        assert_eq!(fitted.history().len(), 26);
    }

    #[test]
    fn test_unforecastable_feature_is_soft_failure() {
        let graph = GraphSpec::from_json(
            r#"{
                "y": {"type": "Dependent Variable", "column": "Sales", "dependencies": ["ols", "m"]},
                "ols": {"type": "Modelling", "method": "OLS"},
                "m": {"type": "Merge", "dependencies": ["p", "t"]},
                "p": {"type": "Independent Variable", "column": "Price", "dependencies": ["id"]},
                "id": {"type": "Modelling", "method": "Identity"},
                "t": {"type": "Independent Variable", "column": "TimeIndex"}
            }"#,
        )
        .unwrap();
        let history = table(12, &[("Price", &|i: u32| 10.0 + (i % 3) as f64), ("Sales", &|i: u32| 3.0 * i as f64)]);
        let driver = WalkForward::new(&graph, config((0, 7), (8, 11), (12, 14))).unwrap();

        let out = driver.run(history, &mut NoExperiments).unwrap();
        assert_eq!(out.predictions.len(), 3);
        assert!(out.predictions.column("Sales").unwrap().iter().all(|v| v.is_nan()));
        out.predictions.check_time_index().unwrap();
    }

    #[test]
    fn test_missing_method_fails_the_roll_forward() {
        let graph = GraphSpec::from_json(
            r#"{
                "y": {"type": "Dependent Variable", "column": "Sales", "dependencies": ["ols", "m"]},
                "ols": {"type": "Modelling", "method": "WLS", "parameter": "DESC"},
                "m": {"type": "Merge", "dependencies": ["p"]},
                "p": {"type": "Independent Variable", "column": "Price"}
            }"#,
        )
        .unwrap();
        let history = table(12, &[("Price", &|i: u32| i as f64), ("Sales", &|i: u32| 2.0 * i as f64)]);
        let driver = WalkForward::new(&graph, config((0, 7), (8, 11), (12, 14))).unwrap();

        let mut fitted = driver.prepare(history).unwrap();
        let mut outputs = NoExperiments;
        let results: Vec<Result<ForecastRow>> = fitted.roll_forward(&mut outputs).collect();
        assert_eq!(results.len(), 1);
        let err = results[0].clone().unwrap_err();
        assert_eq!(err, ForecastError::MissingExtrapolationMethod("Price".into()));
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_graph_without_regression_is_rejected() {
        let graph = GraphSpec::from_json(
            r#"{
                "y": {"type": "Dependent Variable", "column": "Sales", "dependencies": ["m"]},
                "m": {"type": "Merge", "dependencies": ["t"]},
                "t": {"type": "Independent Variable", "column": "TimeIndex"}
            }"#,
        )
        .unwrap();
        let history = table(12, &[("Sales", &|i: u32| i as f64)]);
        let driver = WalkForward::new(&graph, config((0, 7), (8, 11), (12, 14))).unwrap();
        assert!(matches!(driver.prepare(history), Err(ForecastError::InvalidConfig(_))));
    }
}
