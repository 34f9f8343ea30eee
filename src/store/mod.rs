//! Graph definitions: typed nodes and the `GraphSpec` container.
pub mod registry;
pub mod types;

pub use registry::GraphSpec;
pub use types::{MixerOp, ModelMethod, NodeKey, NodeKind, NodeSpec, TransformMethod};
