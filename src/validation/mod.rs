//! Static checks run on a `GraphSpec` before any evaluation.
//!
//! Each rule inspects one node and its direct dependencies; the validator
//! collects every finding so a graph author sees all problems at once.

pub use self::error::{ValidationError, ValidationErrorType};
pub use self::validator::{validate_graph, Validator};

// --- MODULE DECLARATIONS ---
mod error;
mod validator;
mod rules {
    pub mod arity;
    pub mod placement;
    pub mod references;
}
