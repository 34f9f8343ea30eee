//! Crate-wide error type.
//!
//! Faults fall into two buckets: configuration faults (a defect in the graph
//! or run definition, surfaced immediately) and data faults (the caller can
//! fix the input and retry). Missing values are not errors; they travel as
//! NaN through the evaluator and the forecast loop.

use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    // --- Configuration faults ---
    #[error("Unknown node kind '{0}'")]
    UnknownNodeKind(String),
    #[error("Unknown node '{0}'")]
    UnknownNode(String),
    #[error("Graph has no dependent variable")]
    MissingRoot,
    #[error("Graph has {0} dependent variables, expected exactly one")]
    DuplicateRoot(usize),
    #[error("Cycle detected involving node '{0}'")]
    CycleDetected(String),
    #[error("Operand count mismatch at '{node}': {operator} expects {expected}, got {actual}")]
    OperandCountMismatch { node: String, operator: String, expected: usize, actual: usize },
    #[error("Invalid parameter for '{node}': {message}")]
    InvalidParameter { node: String, message: String },
    #[error("Unknown modelling method '{0}'")]
    UnknownMethod(String),
    #[error("Unknown regression algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("No extrapolation method declared for variable '{0}'")]
    MissingExtrapolationMethod(String),
    #[error("Node '{0}' cannot be evaluated directly")]
    NotEvaluable(String),
    #[error("Invalid graph: {}", format_validation(.0))]
    InvalidGraph(Vec<ValidationError>),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // --- Data faults ---
    #[error("Column '{0}' not found")]
    MissingColumn(String),
    #[error("Length mismatch for column '{column}': expected {expected}, got {actual}")]
    LengthMismatch { column: String, expected: usize, actual: usize },
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Model has not been fitted")]
    NotFitted,
    #[error("Experiment output {ordinal} unavailable: {message}")]
    ExperimentUnavailable { ordinal: u32, message: String },

    // --- Boundary ---
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl ForecastError {
    /// True for defects in the graph or run definition. These are never
    /// retried; the caller has to fix the configuration.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            ForecastError::UnknownNodeKind(_)
                | ForecastError::UnknownNode(_)
                | ForecastError::MissingRoot
                | ForecastError::DuplicateRoot(_)
                | ForecastError::CycleDetected(_)
                | ForecastError::OperandCountMismatch { .. }
                | ForecastError::InvalidParameter { .. }
                | ForecastError::UnknownMethod(_)
                | ForecastError::UnknownAlgorithm(_)
                | ForecastError::MissingExtrapolationMethod(_)
                | ForecastError::NotEvaluable(_)
                | ForecastError::InvalidGraph(_)
                | ForecastError::InvalidConfig(_)
        )
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(e: serde_json::Error) -> Self {
        ForecastError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(e: std::io::Error) -> Self {
        ForecastError::Io(e.to_string())
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

pub type Result<T> = std::result::Result<T, ForecastError>;
