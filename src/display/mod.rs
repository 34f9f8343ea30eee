//! Human-readable renderings of graphs and their evaluated values.
pub mod trace;

pub use trace::format_trace;
