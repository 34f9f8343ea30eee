//! Evaluates a feature graph against a table.
pub mod evaluator;
pub mod kernel;
pub mod ledger;

pub use evaluator::Evaluator;
pub use ledger::{EvaluationResult, Ledger, Series, TargetBundle};
