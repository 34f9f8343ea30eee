//! extrapolation.rs
//! Synthesizes future values of exogenous variables so the graph can be
//! re-evaluated one prediction step at a time.
//!
//! A window is the prediction date plus the `back_window - 1` dates before
//! it. Rows already in the history are kept as they are; missing rows are
//! synthesized oldest first, each seeing the rows synthesized before it.

use super::provider::ExperimentOutputs;
use super::variables::{VariableDescriptor, VariableRole};
use crate::calendar::{annual_rate_to_period_rate, previous_dates, Frequency};
use crate::data::{Table, MISSING, TIME_INDEX};
use crate::error::{ForecastError, Result};
use crate::store::ModelMethod;
use chrono::NaiveDate;
use tracing::trace;

pub const DEFAULT_BACK_WINDOW: usize = 5;

#[derive(Debug, Clone)]
pub struct Extrapolator<'v> {
    variables: &'v [VariableDescriptor],
    freq: Frequency,
    back_window: usize,
}

impl<'v> Extrapolator<'v> {
    pub fn new(variables: &'v [VariableDescriptor], freq: Frequency) -> Self {
        Self { variables, freq, back_window: DEFAULT_BACK_WINDOW }
    }

    /// Sets the window length. Values below 1 are treated as 1.
    pub fn with_back_window(mut self, back_window: usize) -> Self {
        self.back_window = back_window.max(1);
        self
    }

    pub fn frequency(&self) -> Frequency { self.freq }

    /// The window's dates, oldest first, ending at `date`.
    pub fn window_dates(&self, date: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = previous_dates(date, self.freq, self.back_window - 1);
        dates.push(date);
        dates
    }

    /// Builds the window ending at `date` from `history`, which holds the
    /// variable columns, `TimeIndex` and every row known or predicted so far.
    pub fn build_window(
        &self,
        history: &Table,
        date: NaiveDate,
        outputs: &mut dyn ExperimentOutputs,
    ) -> Result<Table> {
        let dates = self.window_dates(date);
        let mut working = history.up_to(date);

        for &d in &dates {
            if working.position_of(d).is_some() {
                continue;
            }
            let mut row = Vec::with_capacity(self.variables.len());
            for var in self.variables {
                let value = self.synthesize(&working, var, d, outputs)?;
                row.push((var.column.as_str(), value));
            }
            trace!(date = %d, "synthesized window row");
            working.push_row(d, &row)?;
        }
        fill_time_index(&mut working)?;

        let mut window = Table::new(dates.clone());
        for name in working.column_names() {
            let values = dates.iter().map(|&d| working.value_at(d, name)).collect();
            window.set_column(name, values)?;
        }
        Ok(window)
    }

    /// One variable's value at `date`, given the rows in `working`.
    pub fn synthesize(
        &self,
        working: &Table,
        var: &VariableDescriptor,
        date: NaiveDate,
        outputs: &mut dyn ExperimentOutputs,
    ) -> Result<f64> {
        let column = var.column.as_str();
        if var.role == VariableRole::Dependent {
            return Ok(working.value_at(date, column));
        }

        let method = var.method.ok_or_else(|| ForecastError::MissingExtrapolationMethod(var.column.clone()))?;
        let value = match method {
            ModelMethod::Identity => working.value_at(date, column),
            ModelMethod::Cagr { stride, window } => {
                let rate = cagr_rate(working.require_column(column)?, window as usize);
                self.lookup_back(working, column, date, stride) * (1.0 + rate).powf(stride as f64 / window as f64)
            }
            ModelMethod::Growth { offset, annual_percent } => {
                let rate = annual_rate_to_period_rate(annual_percent, self.freq);
                self.lookup_back(working, column, date, offset) * (1.0 + rate).powi(offset as i32)
            }
            ModelMethod::ExperimentOutput { ordinal } => outputs.experiment_output(ordinal)?.value_at(date, column),
            ModelMethod::Regression { .. } => {
                return Err(ForecastError::MissingExtrapolationMethod(var.column.clone()));
            }
        };
        Ok(value)
    }

    fn lookup_back(&self, working: &Table, column: &str, date: NaiveDate, periods: u32) -> f64 {
        self.freq
            .shift(date, -(periods as i64))
            .map_or(MISSING, |d| working.value_at(d, column))
    }
}

/// Compound growth rate per `window`-row block.
///
/// Compares the mean of the first block with the mean of the last full
/// block; missing values are skipped in both means. The exponent is the
/// number of full blocks, so the result is missing when there is fewer than
/// one block or the first block averages to zero.
pub fn cagr_rate(values: &[f64], window: usize) -> f64 {
    if window == 0 {
        return MISSING;
    }
    let blocks = values.len() / window;
    if blocks == 0 {
        return MISSING;
    }
    let oldest = nan_mean(&values[..window]);
    let newest = nan_mean(&values[window * (blocks - 1)..window * blocks]);
    if oldest == 0.0 {
        return MISSING;
    }
    (newest / oldest).powf(1.0 / blocks as f64) - 1.0
}

fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { MISSING } else { sum / n as f64 }
}

/// Fills missing `TimeIndex` entries by a fixed offset from the last row
/// that has one: row `i` gets `i + (index - position)` of that row.
pub fn fill_time_index(table: &mut Table) -> Result<()> {
    let Some(index) = table.column(TIME_INDEX) else { return Ok(()) };
    let Some(last) = index.iter().rposition(|v| !v.is_nan()) else {
        return Err(ForecastError::InsufficientData("no known TimeIndex to extend".into()));
    };
    let offset = index[last] - last as f64;
    let filled = index
        .iter()
        .enumerate()
        .map(|(i, &v)| if v.is_nan() { i as f64 + offset } else { v })
        .collect();
    table.set_column(TIME_INDEX, filled)
}
