//! provider.rs
//! Collaborator seams for a forecast run: where historical data, graphs and
//! prior experiment outputs come from, and where results go.
//!
//! `InMemoryStore` is the reference implementation. A simulation holds one
//! table per experiment ordinal; ordinal 0 is the initial data.

use crate::data::Table;
use crate::error::{ForecastError, Result};
use crate::model::Metrics;
use crate::store::GraphSpec;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Read-only access to the output table of earlier experiments in the same
/// simulation, keyed by ordinal.
pub trait ExperimentOutputs {
    fn experiment_output(&mut self, ordinal: u32) -> Result<Arc<Table>>;
}

pub trait DataStore {
    fn initial_data(&self, simulation: &str) -> Result<Table>;
    fn experiment_data(&self, simulation: &str, ordinal: u32) -> Result<Table>;
}

pub trait GraphStore {
    fn load_graph(&self, experiment: &str) -> Result<GraphSpec>;
    fn save_graph(&mut self, experiment: &str, graph: &GraphSpec) -> Result<()>;
}

pub trait ResultSink {
    /// Persists one run: its configuration and metrics plus the predicted rows.
    fn store_run(&mut self, simulation: &str, ordinal: u32, record: RunRecord, predictions: &Table) -> Result<()>;
}

/// Configuration and results persisted for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub config: GraphSpec,
    pub results: Metrics,
}

/// A run with no earlier experiments to draw on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExperiments;

impl ExperimentOutputs for NoExperiments {
    fn experiment_output(&mut self, ordinal: u32) -> Result<Arc<Table>> {
        Err(ForecastError::ExperimentUnavailable { ordinal, message: "no experiment provider configured".into() })
    }
}

impl ExperimentOutputs for BTreeMap<u32, Table> {
    fn experiment_output(&mut self, ordinal: u32) -> Result<Arc<Table>> {
        self.get(&ordinal).cloned().map(Arc::new).ok_or_else(|| ForecastError::ExperimentUnavailable {
            ordinal,
            message: "not found".into(),
        })
    }
}

/// Serves experiment outputs of one simulation from a [`DataStore`], loading
/// each ordinal at most once.
pub struct SimulationOutputs<'s, S: DataStore + ?Sized> {
    store: &'s S,
    simulation: String,
    loaded: HashMap<u32, Arc<Table>>,
}

impl<'s, S: DataStore + ?Sized> SimulationOutputs<'s, S> {
    pub fn new(store: &'s S, simulation: impl Into<String>) -> Self {
        Self { store, simulation: simulation.into(), loaded: HashMap::new() }
    }
}

impl<S: DataStore + ?Sized> ExperimentOutputs for SimulationOutputs<'_, S> {
    fn experiment_output(&mut self, ordinal: u32) -> Result<Arc<Table>> {
        if let Some(table) = self.loaded.get(&ordinal) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.store.experiment_data(&self.simulation, ordinal)?);
        debug!(simulation = %self.simulation, ordinal, rows = table.len(), "experiment output loaded");
        self.loaded.insert(ordinal, Arc::clone(&table));
        Ok(table)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    simulations: HashMap<String, BTreeMap<u32, Table>>,
    records: HashMap<(String, u32), RunRecord>,
    /// Graphs are kept in their JSON form, as an external store would.
    graphs: HashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Writes one experiment's rows. Ordinal 0 replaces the whole simulation;
    /// any other ordinal replaces only its own earlier rows.
    pub fn write_experiment_data(&mut self, simulation: &str, ordinal: u32, table: Table) {
        let experiments = self.simulations.entry(simulation.to_string()).or_default();
        if ordinal == 0 {
            experiments.clear();
        } else {
            experiments.remove(&ordinal);
        }
        experiments.insert(ordinal, table);
    }

    pub fn record(&self, simulation: &str, ordinal: u32) -> Option<&RunRecord> {
        self.records.get(&(simulation.to_string(), ordinal))
    }

    /// Highest stored ordinal, 0 when only the initial data exists.
    pub fn experiment_count(&self, simulation: &str) -> u32 {
        self.simulations
            .get(simulation)
            .and_then(|e| e.keys().next_back().copied())
            .unwrap_or(0)
    }

    pub fn delete_experiment(&mut self, simulation: &str, ordinal: u32) {
        if let Some(experiments) = self.simulations.get_mut(simulation) {
            experiments.remove(&ordinal);
        }
        self.records.remove(&(simulation.to_string(), ordinal));
    }

    pub fn delete_simulation(&mut self, simulation: &str) {
        self.simulations.remove(simulation);
        self.records.retain(|(sim, _), _| sim != simulation);
    }
}

impl DataStore for InMemoryStore {
    fn initial_data(&self, simulation: &str) -> Result<Table> {
        self.experiment_data(simulation, 0)
            .map_err(|_| ForecastError::InsufficientData(format!("simulation '{}' has no data", simulation)))
    }

    fn experiment_data(&self, simulation: &str, ordinal: u32) -> Result<Table> {
        self.simulations
            .get(simulation)
            .and_then(|e| e.get(&ordinal))
            .cloned()
            .ok_or_else(|| ForecastError::ExperimentUnavailable {
                ordinal,
                message: format!("simulation '{}' has no such experiment", simulation),
            })
    }
}

impl GraphStore for InMemoryStore {
    fn load_graph(&self, experiment: &str) -> Result<GraphSpec> {
        let json = self
            .graphs
            .get(experiment)
            .ok_or_else(|| ForecastError::InvalidConfig(format!("no graph stored for '{}'", experiment)))?;
        GraphSpec::from_json(json)
    }

    fn save_graph(&mut self, experiment: &str, graph: &GraphSpec) -> Result<()> {
        self.graphs.insert(experiment.to_string(), graph.to_json()?);
        Ok(())
    }
}

impl ResultSink for InMemoryStore {
    fn store_run(&mut self, simulation: &str, ordinal: u32, record: RunRecord, predictions: &Table) -> Result<()> {
        self.write_experiment_data(simulation, ordinal, predictions.clone());
        self.records.insert((simulation.to_string(), ordinal), record);
        debug!(simulation, ordinal, rows = predictions.len(), "run stored");
        Ok(())
    }
}
