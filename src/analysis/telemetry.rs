//! telemetry.rs
//! Static profile of a graph: what it contains and how much work an uncached
//! evaluation repeats.

use crate::analysis::topology;
use crate::error::Result;
use crate::store::GraphSpec;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphProfile {
    pub node_count: usize,
    pub kind_counts: BTreeMap<&'static str, usize>,
    /// Node visits made by one uncached evaluation of the root.
    pub uncached_evaluations: usize,
    /// Distinct nodes visited, i.e. the visits a node-result cache needs.
    pub cached_evaluations: usize,
    /// Nodes visited more than once, with their visit count, most visited first.
    pub shared_nodes: Vec<(String, usize)>,
}

impl GraphProfile {
    pub fn analyze(graph: &GraphSpec) -> Result<Self> {
        let mut kind_counts = BTreeMap::new();
        for (_, node) in graph.iter() {
            *kind_counts.entry(node.kind.label()).or_insert(0) += 1;
        }

        let (root, _) = graph.root()?;
        let counts = topology::path_counts(graph, root)?;

        let mut shared_nodes: Vec<(String, usize)> = counts
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(k, &n)| (k.to_string(), n))
            .collect();
        shared_nodes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            node_count: graph.len(),
            kind_counts,
            uncached_evaluations: counts.values().sum(),
            cached_evaluations: counts.len(),
            shared_nodes,
        })
    }

    /// Ratio of uncached to cached visits; 1.0 means caching saves nothing.
    pub fn cache_benefit(&self) -> f64 {
        if self.cached_evaluations == 0 {
            return 1.0;
        }
        self.uncached_evaluations as f64 / self.cached_evaluations as f64
    }
}
