//! Walk-forward forecasting over an evaluated feature graph.
pub mod driver;
pub mod extrapolation;
pub mod provider;
pub mod variables;

pub use driver::{human_time, FittedForecast, ForecastOutput, ForecastRow, Phase, RollForward, WalkForward};
pub use extrapolation::{Extrapolator, DEFAULT_BACK_WINDOW};
pub use provider::{
    DataStore, ExperimentOutputs, GraphStore, InMemoryStore, NoExperiments, ResultSink, RunRecord, SimulationOutputs,
};
pub use variables::{extract_variables, VariableDescriptor, VariableRole};
