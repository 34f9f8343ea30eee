//! Defines the error types for the validation module.
use std::fmt;

/// The specific category of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorType {
    /// A dependency key that names no node.
    UnknownNode,
    /// Graph-wide shape: root count, cycles.
    Structural,
    /// Wrong number of dependencies for the node kind.
    Arity,
    /// A dependency of a kind the consuming node cannot use.
    Placement,
}

/// A structured error report from the static analysis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The key of the node where the error was detected.
    pub node_key: String,
    pub error_type: ValidationErrorType,
    /// A human-readable message explaining the error.
    pub message: String,
}

impl ValidationError {
    pub fn new(node_key: &str, error_type: ValidationErrorType, message: impl Into<String>) -> Self {
        Self { node_key: node_key.to_string(), error_type, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.node_key, self.message)
    }
}
