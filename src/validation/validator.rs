//! Runs the reference, arity and placement rules over a GraphSpec.
use super::error::{ValidationError, ValidationErrorType};
use super::rules::{arity, placement, references};
use crate::analysis::topology;
use crate::error::ForecastError;
use crate::store::{GraphSpec, NodeKind};

/// Runs every rule against a graph and collects the findings.
pub struct Validator<'a> {
    graph: &'a GraphSpec,
}

impl<'a> Validator<'a> {
    pub fn new(graph: &'a GraphSpec) -> Self {
        Self { graph }
    }

    /// Returns every problem found; `Ok` when there are none.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        // Node-local rules.
        for (key, node) in self.graph.iter() {
            errors.extend(references::validate_references(self.graph, key, node));
            errors.extend(arity::validate_arity(key, node));
            errors.extend(placement::validate_placement(self.graph, key, node));
        }

        // Graph-wide rules.
        let roots: Vec<&str> = self
            .graph
            .iter()
            .filter(|(_, n)| matches!(n.kind, NodeKind::DependentVariable { .. }))
            .map(|(k, _)| k)
            .collect();
        match roots.len() {
            1 => {}
            0 => errors.push(ValidationError::new(
                "<graph>",
                ValidationErrorType::Structural,
                "Graph has no Dependent Variable",
            )),
            n => errors.push(ValidationError::new(
                "<graph>",
                ValidationErrorType::Structural,
                format!("Graph has {} Dependent Variables ({}), expected exactly one", n, roots.join(", ")),
            )),
        }

        if let Err(ForecastError::CycleDetected(node)) = topology::sort(self.graph) {
            errors.push(ValidationError::new(&node, ValidationErrorType::Structural, "Node is part of a cycle"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Convenience wrapper returning the findings as a plain list.
pub fn validate_graph(graph: &GraphSpec) -> Vec<ValidationError> {
    Validator::new(graph).validate().err().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn errors_for(json: &str) -> Vec<ValidationError> {
        // Bypass load-time validation to inspect the raw findings.
        let graph: GraphSpec = serde_json::from_str(json).unwrap();
        validate_graph(&graph)
    }

    #[test]
    fn test_valid_graph_has_no_findings() {
        let errors = errors_for(
            r#"{
                "y": {"type": "Dependent Variable", "column": "Sales", "dependencies": ["m", "ols"]},
                "ols": {"type": "Modelling", "method": "WLS", "parameter": "ASC"},
                "m": {"type": "Merge", "dependencies": ["x", "lag"]},
                "x": {"type": "Independent Variable", "column": "Price", "dependencies": ["g"]},
                "g": {"type": "Modelling", "method": "Growth", "parameter": "1,3"},
                "lag": {"type": "Transformation", "method": "Lag", "parameter": 1, "dependencies": ["x"]}
            }"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[rstest]
    #[case(r#"{"y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m"]},
               "m": {"type": "Merge", "dependencies": ["d"]},
               "d": {"type": "Subtract", "dependencies": ["x"]},
               "x": {"type": "Independent Variable", "column": "B"}}"#, ValidationErrorType::Arity)]
    #[case(r#"{"y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m"]},
               "m": {"type": "Merge", "dependencies": ["t"]},
               "t": {"type": "Transformation", "method": "Log", "dependencies": ["x", "x"]},
               "x": {"type": "Independent Variable", "column": "B"}}"#, ValidationErrorType::Arity)]
    #[case(r#"{"y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m"]},
               "m": {"type": "Merge", "dependencies": ["x"]},
               "x": {"type": "Independent Variable", "column": "B", "dependencies": ["o"]},
               "o": {"type": "Modelling", "method": "OLS"}}"#, ValidationErrorType::Placement)]
    #[case(r#"{"y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m"]},
               "m": {"type": "Merge", "dependencies": ["ghost"]}}"#, ValidationErrorType::UnknownNode)]
    #[case(r#"{"x": {"type": "Independent Variable", "column": "B"}}"#, ValidationErrorType::Structural)]
    #[case(r#"{"y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m"]},
               "m": {"type": "Merge", "dependencies": ["a"]},
               "a": {"type": "Transformation", "method": "Identity", "dependencies": ["b"]},
               "b": {"type": "Transformation", "method": "Identity", "dependencies": ["a"]}}"#, ValidationErrorType::Structural)]
    fn test_rule_findings(#[case] json: &str, #[case] expected: ValidationErrorType) {
        let errors = errors_for(json);
        assert!(errors.iter().any(|e| e.error_type == expected), "{:?}", errors);
    }

    #[test]
    fn test_two_merges_on_root_rejected() {
        let errors = errors_for(
            r#"{
                "y": {"type": "Dependent Variable", "column": "A", "dependencies": ["m1", "m2"]},
                "m1": {"type": "Merge", "dependencies": ["x"]},
                "m2": {"type": "Merge", "dependencies": ["x"]},
                "x": {"type": "Independent Variable", "column": "B"}
            }"#,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node_key, "y");
        assert!(errors[0].to_string().contains("at most one Merge"));
    }
}
