//! Validation rule for dangling dependency keys.

use crate::store::{GraphSpec, NodeSpec};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Every dependency must name a node in the same graph.
pub(crate) fn validate_references(graph: &GraphSpec, key: &str, node: &NodeSpec) -> Vec<ValidationError> {
    node.dependencies
        .iter()
        .filter(|dep| graph.get(dep).is_none())
        .map(|dep| {
            ValidationError::new(
                key,
                ValidationErrorType::UnknownNode,
                format!("Dependency '{}' does not exist", dep),
            )
        })
        .collect()
}
