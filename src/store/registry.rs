//! registry.rs
//! `GraphSpec`: the node map for one forecasting pipeline, keyed by node key.

use super::types::*;
use crate::error::{ForecastError, Result};
use crate::validation;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSpec {
    nodes: BTreeMap<NodeKey, NodeSpec>,
}

impl GraphSpec {
    pub fn new() -> Self { Self::default() }

    /// Inserts or replaces a node. No validation happens until [`GraphSpec::validate`].
    pub fn insert(&mut self, key: impl Into<NodeKey>, node: NodeSpec) -> &mut Self {
        self.nodes.insert(key.into(), node);
        self
    }

    /// Parses and validates a graph from its JSON node map.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<NodeKey, RawNode> = serde_json::from_str(json)?;
        let graph = Self::from_raw(raw)?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    fn from_raw(raw: BTreeMap<NodeKey, RawNode>) -> Result<Self> {
        let nodes = raw
            .into_iter()
            .map(|(key, node)| NodeSpec::from_raw(&key, node).map(|spec| (key, spec)))
            .collect::<Result<_>>()?;
        Ok(Self { nodes })
    }

    fn to_raw(&self) -> BTreeMap<&str, RawNode> {
        self.nodes.iter().map(|(k, n)| (k.as_str(), n.to_raw())).collect()
    }

    // --- Accessors ---

    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn get(&self, key: &str) -> Option<&NodeSpec> {
        self.nodes.get(key)
    }

    pub fn node(&self, key: &str) -> Result<&NodeSpec> {
        self.get(key).ok_or_else(|| ForecastError::UnknownNode(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(k, n)| (k.as_str(), n))
    }

    /// The unique Dependent Variable node and its target column.
    pub fn root(&self) -> Result<(&str, &str)> {
        let mut roots = self.iter().filter_map(|(key, node)| match &node.kind {
            NodeKind::DependentVariable { column } => Some((key, column.as_str())),
            _ => None,
        });
        let first = roots.next().ok_or(ForecastError::MissingRoot)?;
        let extra = roots.count();
        if extra > 0 {
            return Err(ForecastError::DuplicateRoot(extra + 1));
        }
        Ok(first)
    }

    /// `(dependency, dependent)` pairs in dependency order, for edge-list storage.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.iter()
            .flat_map(|(key, node)| node.dependencies.iter().map(move |dep| (dep.as_str(), key)))
            .collect()
    }

    /// Structural checks; every problem is reported at once.
    pub fn validate(&self) -> Result<()> {
        let errors = validation::validate_graph(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::InvalidGraph(errors))
        }
    }
}

impl Serialize for GraphSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GraphSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<NodeKey, RawNode>::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(D::Error::custom)
    }
}
