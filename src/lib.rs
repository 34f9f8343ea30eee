//! chronomodel_core: feature-graph evaluation and walk-forward forecasting.
//!
//! A forecasting pipeline is a `GraphSpec` of variables, transforms, mixers,
//! merges and modelling nodes. The `compute` evaluator turns it into a
//! target and feature table, `model` fits a regression backend on it, and
//! `forecast` extends the series into the future one step at a time.

pub mod analysis;
pub mod calendar;
pub mod compute;
pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod forecast;
pub mod logging;
pub mod model;
pub mod store;
pub mod validation;

pub use calendar::Frequency;
pub use compute::{EvaluationResult, Evaluator, TargetBundle};
pub use config::{DateWindow, ForecastConfig};
pub use data::{Table, MISSING, TIME, TIME_INDEX};
pub use error::{ForecastError, Result};
pub use forecast::{ForecastOutput, WalkForward};
pub use model::{Algorithm, Metrics, RegressionBackend};
pub use store::{GraphSpec, NodeKind, NodeSpec};
