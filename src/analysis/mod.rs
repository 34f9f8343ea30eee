//! Static analysis over graph structure.
pub mod telemetry;
pub mod topology;

pub use telemetry::GraphProfile;
