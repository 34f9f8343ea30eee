//! types.rs
//! Strongly typed graph nodes and their JSON wire form.
//!
//! On the wire each node is a flat object: `{"type": ..., "dependencies": [...]}`
//! plus `column`, `value`, `method`, `parameter` or `operator` as the kind
//! requires. Parameters may arrive as a number, a comma string (`"12,3"`) or a
//! list; they are checked here so a malformed node never reaches the evaluator.

use crate::error::{ForecastError, Result};
use crate::model::{Algorithm, SampleOrder};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

pub type NodeKey = String;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Ordered; Merge and Mixer operands follow this order.
    pub dependencies: SmallVec<[NodeKey; 4]>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    IndependentVariable { column: String },
    DependentVariable { column: String },
    Constant { value: f64 },
    Transformation { method: TransformMethod },
    Mixer { operator: MixerOp },
    Merge,
    Modelling { method: ModelMethod },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformMethod {
    Identity,
    Sine { period: f64 },
    Cosine { period: f64 },
    Exponent,
    Log,
    Power { exponent: f64 },
    Lag { periods: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixerOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// How a variable's future values are produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelMethod {
    Regression { algorithm: Algorithm, sample_order: Option<SampleOrder> },
    Identity,
    Cagr { stride: u32, window: u32 },
    Growth { offset: u32, annual_percent: f64 },
    ExperimentOutput { ordinal: u32 },
}

// --- Labels ---

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::IndependentVariable { .. } => "Independent Variable",
            NodeKind::DependentVariable { .. } => "Dependent Variable",
            NodeKind::Constant { .. } => "Constant",
            NodeKind::Transformation { .. } => "Transformation",
            NodeKind::Mixer { .. } => "Mixer",
            NodeKind::Merge => "Merge",
            NodeKind::Modelling { .. } => "Modelling",
        }
    }

    /// The column a Variable node reads.
    pub fn variable_column(&self) -> Option<&str> {
        match self {
            NodeKind::IndependentVariable { column } | NodeKind::DependentVariable { column } => Some(column),
            _ => None,
        }
    }
}

impl TransformMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TransformMethod::Identity => "Identity",
            TransformMethod::Sine { .. } => "Sine",
            TransformMethod::Cosine { .. } => "Cosine",
            TransformMethod::Exponent => "Exponent",
            TransformMethod::Log => "Log",
            TransformMethod::Power { .. } => "Power",
            TransformMethod::Lag { .. } => "Lag",
        }
    }

    fn parameter(&self) -> Option<f64> {
        match *self {
            TransformMethod::Sine { period } | TransformMethod::Cosine { period } => Some(period),
            TransformMethod::Power { exponent } => Some(exponent),
            TransformMethod::Lag { periods } => Some(periods as f64),
            _ => None,
        }
    }
}

impl MixerOp {
    pub fn name(&self) -> &'static str {
        match self {
            MixerOp::Add => "Add",
            MixerOp::Subtract => "Subtract",
            MixerOp::Multiply => "Multiply",
            MixerOp::Divide => "Divide",
        }
    }

    /// Required operand count; `None` for variadic Add.
    pub fn arity(&self) -> Option<usize> {
        match self {
            MixerOp::Add => None,
            _ => Some(2),
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "Add" => Some(MixerOp::Add),
            "Subtract" => Some(MixerOp::Subtract),
            "Multiply" => Some(MixerOp::Multiply),
            "Divide" | "Division" => Some(MixerOp::Divide),
            _ => None,
        }
    }
}

impl ModelMethod {
    pub fn name(&self) -> String {
        match self {
            ModelMethod::Regression { algorithm, .. } => algorithm.name().to_string(),
            ModelMethod::Identity => "Identity".into(),
            ModelMethod::Cagr { .. } => "CAGR".into(),
            ModelMethod::Growth { .. } => "Growth".into(),
            ModelMethod::ExperimentOutput { .. } => "Experiment Output".into(),
        }
    }

    fn parameter_string(&self) -> Option<String> {
        match self {
            ModelMethod::Regression { sample_order: Some(SampleOrder::Ascending), .. } => Some("ASC".into()),
            ModelMethod::Regression { sample_order: Some(SampleOrder::Descending), .. } => Some("DESC".into()),
            ModelMethod::Regression { .. } | ModelMethod::Identity => None,
            ModelMethod::Cagr { stride, window } => Some(format!("{},{}", stride, window)),
            ModelMethod::Growth { offset, annual_percent } => Some(format!("{},{}", offset, annual_percent)),
            ModelMethod::ExperimentOutput { ordinal } => Some(ordinal.to_string()),
        }
    }

    pub fn is_regression(&self) -> bool {
        matches!(self, ModelMethod::Regression { .. })
    }
}

impl fmt::Display for ModelMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameter_string() {
            Some(p) => write!(f, "{}({})", self.name(), p),
            None => f.write_str(&self.name()),
        }
    }
}

// --- Wire form ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawScalar {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawParameter {
    Number(f64),
    Text(String),
    List(Vec<RawScalar>),
}

impl RawParameter {
    /// Flattens any accepted shape into trimmed, non-empty tokens.
    fn tokens(&self) -> Vec<String> {
        let parts: Vec<String> = match self {
            RawParameter::Number(n) => vec![n.to_string()],
            RawParameter::Text(s) => s.split(',').map(str::to_string).collect(),
            RawParameter::List(items) => items
                .iter()
                .map(|i| match i {
                    RawScalar::Number(n) => n.to_string(),
                    RawScalar::Text(s) => s.clone(),
                })
                .collect(),
        };
        parts.into_iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawNode {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    dependencies: SmallVec<[NodeKey; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter: Option<RawParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator: Option<String>,
}

struct ParamReader<'a> {
    node: &'a str,
    tokens: Vec<String>,
}

impl<'a> ParamReader<'a> {
    fn new(node: &'a str, raw: &Option<RawParameter>) -> Self {
        Self { node, tokens: raw.as_ref().map(RawParameter::tokens).unwrap_or_default() }
    }

    fn invalid(&self, message: impl Into<String>) -> ForecastError {
        ForecastError::InvalidParameter { node: self.node.to_string(), message: message.into() }
    }

    fn expect_count(&self, method: &str, n: usize) -> Result<()> {
        if self.tokens.len() != n {
            return Err(self.invalid(format!(
                "{} expects {} parameter(s), got {}",
                method,
                n,
                self.tokens.len()
            )));
        }
        Ok(())
    }

    fn number(&self, idx: usize) -> Result<f64> {
        let token = &self.tokens[idx];
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(format!("'{}' is not a number", token)))
    }

    fn integer(&self, idx: usize) -> Result<i64> {
        let v = self.number(idx)?;
        if v.fract() != 0.0 {
            return Err(self.invalid(format!("'{}' is not an integer", self.tokens[idx])));
        }
        Ok(v as i64)
    }

    fn count(&self, idx: usize, what: &str) -> Result<u32> {
        let v = self.integer(idx)?;
        u32::try_from(v).map_err(|_| self.invalid(format!("{} must be non-negative, got {}", what, v)))
    }
}

fn required<T>(node: &str, field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| ForecastError::InvalidParameter {
        node: node.to_string(),
        message: format!("missing '{}'", field),
    })
}

fn parse_transform(key: &str, raw: &RawNode) -> Result<TransformMethod> {
    let method = required(key, "method", raw.method.as_deref())?;
    let params = ParamReader::new(key, &raw.parameter);
    let one_number = || -> Result<f64> {
        params.expect_count(method, 1)?;
        params.number(0)
    };
    let method = match method {
        "Identity" => TransformMethod::Identity,
        "Exponent" => TransformMethod::Exponent,
        "Log" => TransformMethod::Log,
        "Sine" | "Cosine" => {
            let period = one_number()?;
            if period == 0.0 {
                return Err(params.invalid("period must be non-zero"));
            }
            if method == "Sine" { TransformMethod::Sine { period } } else { TransformMethod::Cosine { period } }
        }
        "Power" => TransformMethod::Power { exponent: one_number()? },
        "Lag" => {
            params.expect_count(method, 1)?;
            TransformMethod::Lag { periods: params.integer(0)? }
        }
        other => return Err(ForecastError::UnknownMethod(other.to_string())),
    };
    Ok(method)
}

fn parse_model(key: &str, raw: &RawNode) -> Result<ModelMethod> {
    let method = required(key, "method", raw.method.as_deref())?;
    let params = ParamReader::new(key, &raw.parameter);
    let method = match method {
        "Identity" => ModelMethod::Identity,
        "CAGR" => {
            params.expect_count(method, 2)?;
            let (stride, window) = (params.count(0, "stride")?, params.count(1, "window")?);
            if window == 0 {
                return Err(params.invalid("CAGR window must be at least 1"));
            }
            ModelMethod::Cagr { stride, window }
        }
        "Growth" => {
            params.expect_count(method, 2)?;
            ModelMethod::Growth { offset: params.count(0, "offset")?, annual_percent: params.number(1)? }
        }
        "Experiment Output" => {
            params.expect_count(method, 1)?;
            ModelMethod::ExperimentOutput { ordinal: params.count(0, "ordinal")? }
        }
        other => {
            let algorithm: Algorithm =
                other.parse().map_err(|_| ForecastError::UnknownMethod(other.to_string()))?;
            let sample_order = match params.tokens.as_slice() {
                [] => None,
                [order] => Some(order.parse::<SampleOrder>().map_err(|_| {
                    params.invalid(format!("sample order must be ASC or DESC, got '{}'", order))
                })?),
                _ => return Err(params.invalid("regression takes at most one parameter")),
            };
            ModelMethod::Regression { algorithm, sample_order }
        }
    };
    Ok(method)
}

impl NodeSpec {
    pub fn new(kind: NodeKind, dependencies: &[&str]) -> Self {
        Self { dependencies: dependencies.iter().map(|d| d.to_string()).collect(), kind }
    }

    pub(crate) fn from_raw(key: &str, raw: RawNode) -> Result<Self> {
        let kind = match raw.kind.as_str() {
            "Independent Variable" => {
                NodeKind::IndependentVariable { column: required(key, "column", raw.column.clone())? }
            }
            "Dependent Variable" => {
                NodeKind::DependentVariable { column: required(key, "column", raw.column.clone())? }
            }
            "Constant" => NodeKind::Constant { value: required(key, "value", raw.value)? },
            "Transformation" => NodeKind::Transformation { method: parse_transform(key, &raw)? },
            "Merge" => NodeKind::Merge,
            "Modelling" => NodeKind::Modelling { method: parse_model(key, &raw)? },
            "Mixer" => {
                let name = required(key, "operator", raw.operator.as_deref())?;
                let operator = MixerOp::parse(name).ok_or_else(|| ForecastError::InvalidParameter {
                    node: key.to_string(),
                    message: format!("unknown mixer operator '{}'", name),
                })?;
                NodeKind::Mixer { operator }
            }
            legacy => match MixerOp::parse(legacy) {
                Some(operator) => NodeKind::Mixer { operator },
                None => return Err(ForecastError::UnknownNodeKind(legacy.to_string())),
            },
        };
        Ok(Self { dependencies: raw.dependencies, kind })
    }

    pub(crate) fn to_raw(&self) -> RawNode {
        let mut raw = RawNode {
            kind: self.kind.label().to_string(),
            dependencies: self.dependencies.clone(),
            column: None,
            value: None,
            method: None,
            parameter: None,
            operator: None,
        };
        match &self.kind {
            NodeKind::IndependentVariable { column } | NodeKind::DependentVariable { column } => {
                raw.column = Some(column.clone());
            }
            NodeKind::Constant { value } => raw.value = Some(*value),
            NodeKind::Transformation { method } => {
                raw.method = Some(method.name().to_string());
                raw.parameter = method.parameter().map(RawParameter::Number);
            }
            NodeKind::Mixer { operator } => raw.operator = Some(operator.name().to_string()),
            NodeKind::Merge => {}
            NodeKind::Modelling { method } => {
                raw.method = Some(method.name());
                raw.parameter = method.parameter_string().map(RawParameter::Text);
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(json: &str) -> RawNode {
        serde_json::from_str(json).unwrap()
    }

    #[rstest]
    #[case(r#"{"type": "Modelling", "method": "CAGR", "parameter": "12,3"}"#, ModelMethod::Cagr { stride: 12, window: 3 })]
    #[case(r#"{"type": "Modelling", "method": "CAGR", "parameter": [12.0, 3.0]}"#, ModelMethod::Cagr { stride: 12, window: 3 })]
    #[case(r#"{"type": "Modelling", "method": "Growth", "parameter": "1, 5.5"}"#, ModelMethod::Growth { offset: 1, annual_percent: 5.5 })]
    #[case(r#"{"type": "Modelling", "method": "Experiment Output", "parameter": 2}"#, ModelMethod::ExperimentOutput { ordinal: 2 })]
    #[case(r#"{"type": "Modelling", "method": "Identity"}"#, ModelMethod::Identity)]
    #[case(r#"{"type": "Modelling", "method": "WLS", "parameter": "DESC"}"#, ModelMethod::Regression { algorithm: Algorithm::Wls, sample_order: Some(SampleOrder::Descending) })]
    #[case(r#"{"type": "Modelling", "method": "OLS", "parameter": ""}"#, ModelMethod::Regression { algorithm: Algorithm::Ols, sample_order: None })]
    fn test_modelling_parameters(#[case] json: &str, #[case] expected: ModelMethod) {
        let node = NodeSpec::from_raw("m", raw(json)).unwrap();
        assert_eq!(node.kind, NodeKind::Modelling { method: expected });
    }

    #[rstest]
    #[case(r#"{"type": "Modelling", "method": "CAGR", "parameter": "12"}"#)]
    #[case(r#"{"type": "Modelling", "method": "CAGR", "parameter": "12,0"}"#)]
    #[case(r#"{"type": "Modelling", "method": "Growth", "parameter": "x,5"}"#)]
    #[case(r#"{"type": "Transformation", "method": "Sine", "parameter": 0}"#)]
    #[case(r#"{"type": "Transformation", "method": "Lag", "parameter": 1.5}"#)]
    #[case(r#"{"type": "Independent Variable"}"#)]
    fn test_malformed_parameters_rejected(#[case] json: &str) {
        let err = NodeSpec::from_raw("n", raw(json)).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter { .. }), "{:?}", err);
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_unknown_kind_and_method() {
        assert_eq!(
            NodeSpec::from_raw("n", raw(r#"{"type": "Pivot"}"#)).unwrap_err(),
            ForecastError::UnknownNodeKind("Pivot".into())
        );
        assert_eq!(
            NodeSpec::from_raw("n", raw(r#"{"type": "Modelling", "method": "SVM"}"#)).unwrap_err(),
            ForecastError::UnknownMethod("SVM".into())
        );
    }

    #[rstest]
    #[case(r#"{"type": "Division", "dependencies": ["a", "b"]}"#, MixerOp::Divide)]
    #[case(r#"{"type": "Add", "dependencies": ["a", "b", "c"]}"#, MixerOp::Add)]
    #[case(r#"{"type": "Mixer", "operator": "Subtract", "dependencies": ["a", "b"]}"#, MixerOp::Subtract)]
    fn test_mixer_forms(#[case] json: &str, #[case] expected: MixerOp) {
        let node = NodeSpec::from_raw("mix", raw(json)).unwrap();
        assert_eq!(node.kind, NodeKind::Mixer { operator: expected });
        assert_eq!(node.dependencies[0], "a");
    }

    #[test]
    fn test_wire_form_is_stable() {
        let node = NodeSpec::new(
            NodeKind::Modelling { method: ModelMethod::Growth { offset: 1, annual_percent: 5.5 } },
            &[],
        );
        let back = NodeSpec::from_raw("g", node.to_raw()).unwrap();
        assert_eq!(back, node);
        assert_eq!(node.kind.label(), "Modelling");
    }
}
