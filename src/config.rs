//! config.rs
//! Run configuration for a walk-forward forecast, loaded from JSON.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn default_back_window() -> usize { 5 }
fn default_seed() -> u64 { 42 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub train: DateWindow,
    pub test: DateWindow,
    pub prediction: DateWindow,
    /// Rows handed to the graph per prediction step, the predicted row included.
    #[serde(default = "default_back_window")]
    pub back_window: usize,
    /// Cache node results within each evaluation.
    #[serde(default)]
    pub memoize: bool,
    /// Seed for the randomised backends.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl ForecastConfig {
    pub fn new(train: DateWindow, test: DateWindow, prediction: DateWindow) -> Self {
        Self {
            train,
            test,
            prediction,
            back_window: default_back_window(),
            memoize: false,
            seed: default_seed(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, window) in [("train", &self.train), ("test", &self.test), ("prediction", &self.prediction)] {
            if window.start > window.end {
                return Err(ForecastError::InvalidConfig(format!(
                    "{} window starts after it ends ({} > {})",
                    name, window.start, window.end
                )));
            }
        }
        if self.back_window == 0 {
            return Err(ForecastError::InvalidConfig("back_window must be at least 1".into()));
        }
        Ok(())
    }
}
