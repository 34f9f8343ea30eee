//! Validation rule for which node kinds may feed which.
//!
//! Series-producing nodes (variables read as inputs, constants, transforms,
//! mixers) feed transforms and mixers. Merges collect series or other merges.
//! Modelling nodes attach only to variables: an extrapolation method on an
//! Independent Variable, a regression algorithm on the root. The root itself
//! feeds nothing.

use crate::store::{GraphSpec, ModelMethod, NodeKind, NodeSpec};
use crate::validation::error::{ValidationError, ValidationErrorType};

fn is_series(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::IndependentVariable { .. }
            | NodeKind::Constant { .. }
            | NodeKind::Transformation { .. }
            | NodeKind::Mixer { .. }
    )
}

pub(crate) fn validate_placement(graph: &GraphSpec, key: &str, node: &NodeSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut report = |message: String| {
        errors.push(ValidationError::new(key, ValidationErrorType::Placement, message));
    };

    let mut merges = 0;
    let mut models = 0;
    for dep in &node.dependencies {
        // Dangling keys are reported by the reference rule.
        let Some(dep_node) = graph.get(dep) else { continue };
        let dep_kind = &dep_node.kind;

        match &node.kind {
            NodeKind::Transformation { .. } | NodeKind::Mixer { .. } if !is_series(dep_kind) => {
                report(format!("'{}' ({}) cannot be used as a series input", dep, dep_kind.label()));
            }
            NodeKind::Merge if !is_series(dep_kind) && *dep_kind != NodeKind::Merge => {
                report(format!("'{}' ({}) cannot be merged as a feature", dep, dep_kind.label()));
            }
            NodeKind::IndependentVariable { .. } => match dep_kind {
                NodeKind::Modelling { method } if method.is_regression() => report(format!(
                    "Regression method '{}' on '{}' belongs on the Dependent Variable",
                    method.name(),
                    dep
                )),
                NodeKind::Modelling { .. } => models += 1,
                other => report(format!("'{}' ({}) cannot feed a variable", dep, other.label())),
            },
            NodeKind::DependentVariable { .. } => match dep_kind {
                NodeKind::Merge => merges += 1,
                NodeKind::Modelling { method: ModelMethod::Regression { .. } } => models += 1,
                NodeKind::Modelling { method } => report(format!(
                    "The Dependent Variable needs a regression algorithm, '{}' is an extrapolation method",
                    method.name()
                )),
                other => report(format!("'{}' ({}) cannot feed the Dependent Variable", dep, other.label())),
            },
            _ => {}
        }
    }

    if merges > 1 {
        report(format!("The Dependent Variable takes at most one Merge input, got {}", merges));
    }
    if models > 1 {
        report(format!("At most one Modelling input is allowed, got {}", models));
    }
    errors
}
