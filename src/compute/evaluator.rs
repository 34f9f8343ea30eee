//! evaluator.rs
//! Depth-first evaluation of a `GraphSpec` against a table.
//!
//! Without a cache a node reachable through several paths is recomputed on
//! each path. `with_cache` keeps node results in a [`Ledger`] for the table
//! revision being evaluated.

use super::kernel;
use super::ledger::{EvaluationResult, Ledger, Series, TargetBundle};
use crate::data::Table;
use crate::error::{ForecastError, Result};
use crate::store::{GraphSpec, NodeKind};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct Evaluator<'g> {
    graph: &'g GraphSpec,
    root: &'g str,
    target: &'g str,
    ledger: Option<Ledger>,
}

impl<'g> Evaluator<'g> {
    /// Validates the graph and locates its root.
    pub fn new(graph: &'g GraphSpec) -> Result<Self> {
        graph.validate()?;
        let (root, target) = graph.root()?;
        Ok(Self { graph, root, target, ledger: None })
    }

    pub fn with_cache(mut self) -> Self {
        self.ledger = Some(Ledger::new());
        self
    }

    pub fn root(&self) -> &'g str { self.root }
    pub fn target(&self) -> &'g str { self.target }
    pub fn graph(&self) -> &'g GraphSpec { self.graph }
    pub fn ledger(&self) -> Option<&Ledger> { self.ledger.as_ref() }

    /// Evaluates the root. The table is moved in, augmented with
    /// `Feature 1..N` columns and handed back inside the bundle.
    pub fn evaluate(&mut self, mut table: Table) -> Result<TargetBundle> {
        let graph = self.graph;
        let root = graph.node(self.root)?;
        let mut features = Vec::new();
        let mut model = None;

        for dep in &root.dependencies {
            match &graph.node(dep)?.kind {
                NodeKind::Merge => {
                    let list = match self.eval(dep, &table)? {
                        EvaluationResult::SeriesList(list) => list,
                        other => vec![other.into_series(dep)?],
                    };
                    for series in list {
                        let name = format!("Feature {}", features.len() + 1);
                        table.set_column(name.as_str(), series.to_vec())?;
                        features.push(name);
                    }
                }
                NodeKind::Modelling { method } => model = Some(*method),
                _ => {}
            }
        }

        debug!(root = self.root, target = self.target, features = features.len(), rows = table.len(), "graph evaluated");
        Ok(TargetBundle { target: self.target.to_string(), features, model, data: table })
    }

    /// Evaluates any node. Evaluating the root works on a copy of `table`.
    pub fn evaluate_node(&mut self, key: &str, table: &Table) -> Result<EvaluationResult> {
        if key == self.root {
            return Ok(EvaluationResult::Target(self.evaluate(table.clone())?));
        }
        self.eval(key, table)
    }

    fn eval(&mut self, key: &str, table: &Table) -> Result<EvaluationResult> {
        let identity = table.identity();
        if let Some(hit) = self.ledger.as_mut().and_then(|l| l.get(key, identity)) {
            trace!(node = key, "cache hit");
            return Ok(hit);
        }

        let graph = self.graph;
        let node = graph.node(key)?;
        trace!(node = key, kind = node.kind.label(), "evaluating");
        let result = match &node.kind {
            NodeKind::IndependentVariable { column } => {
                EvaluationResult::Series(Arc::new(table.require_column(column)?.to_vec()))
            }
            NodeKind::Constant { value } => EvaluationResult::Series(Arc::new(vec![*value; table.len()])),
            NodeKind::Transformation { method } => {
                let dep = node.dependencies.first().ok_or_else(|| ForecastError::OperandCountMismatch {
                    node: key.to_string(),
                    operator: method.name().to_string(),
                    expected: 1,
                    actual: 0,
                })?;
                let input = self.eval(dep, table)?.into_series(key)?;
                EvaluationResult::Series(Arc::new(kernel::apply_transform(&input, *method)))
            }
            NodeKind::Mixer { operator } => {
                let operands = node
                    .dependencies
                    .iter()
                    .map(|dep| self.eval(dep, table)?.into_series(key))
                    .collect::<Result<Vec<Series>>>()?;
                EvaluationResult::Series(Arc::new(kernel::apply_mixer(key, *operator, &operands, table.len())?))
            }
            NodeKind::Merge => {
                let mut list = Vec::with_capacity(node.dependencies.len());
                for dep in &node.dependencies {
                    match self.eval(dep, table)? {
                        EvaluationResult::Series(s) => list.push(s),
                        EvaluationResult::SeriesList(nested) => list.extend(nested),
                        EvaluationResult::Target(_) => return Err(ForecastError::NotEvaluable(dep.clone())),
                    }
                }
                EvaluationResult::SeriesList(list)
            }
            NodeKind::DependentVariable { .. } | NodeKind::Modelling { .. } => {
                return Err(ForecastError::NotEvaluable(key.to_string()));
            }
        };

        if let Some(ledger) = self.ledger.as_mut() {
            ledger.insert(key, identity, result.clone());
        }
        Ok(result)
    }
}
