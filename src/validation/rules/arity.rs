//! Validation rule for dependency counts per node kind.

use crate::store::{NodeKind, NodeSpec};
use crate::validation::error::{ValidationError, ValidationErrorType};

pub(crate) fn validate_arity(key: &str, node: &NodeSpec) -> Option<ValidationError> {
    let actual = node.dependencies.len();
    let problem = match &node.kind {
        NodeKind::Constant { .. } | NodeKind::Modelling { .. } if actual > 0 => {
            Some(format!("{} nodes take no inputs, got {}", node.kind.label(), actual))
        }
        NodeKind::Transformation { method } if actual != 1 => {
            Some(format!("Transformation '{}' expects exactly 1 input, got {}", method.name(), actual))
        }
        NodeKind::Mixer { operator } => match operator.arity() {
            Some(expected) if actual != expected => Some(format!(
                "{} expects exactly {} operands, got {}",
                operator.name(),
                expected,
                actual
            )),
            None if actual == 0 => Some(format!("{} expects at least 1 operand", operator.name())),
            _ => None,
        },
        NodeKind::Merge if actual == 0 => Some("Merge expects at least 1 input".to_string()),
        _ => None,
    };
    problem.map(|message| ValidationError::new(key, ValidationErrorType::Arity, message))
}
