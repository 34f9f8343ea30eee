//! topology.rs
//! Dependency-order analysis over a `GraphSpec`.
//!
//! Edges run from a dependency to the node that consumes it, so a topological
//! order lists inputs before their consumers.

use crate::error::{ForecastError, Result};
use crate::store::{GraphSpec, NodeKind, NodeSpec};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use std::collections::{HashMap, HashSet};

/// Builds the dependency graph. Keys that name no node are left out; the
/// validator reports them separately.
pub fn dependency_graph(graph: &GraphSpec) -> DiGraphMap<&str, ()> {
    let mut g = DiGraphMap::new();
    for (key, _) in graph.iter() {
        g.add_node(key);
    }
    for (dep, key) in graph.edges() {
        if graph.get(dep).is_some() {
            g.add_edge(dep, key, ());
        }
    }
    g
}

/// Every node, dependencies first.
pub fn sort(graph: &GraphSpec) -> Result<Vec<&str>> {
    toposort(&dependency_graph(graph), None)
        .map_err(|cycle| ForecastError::CycleDetected(cycle.node_id().to_string()))
}

/// All nodes `start` transitively depends on, including `start` itself.
pub fn upstream_from<'a>(graph: &'a GraphSpec, start: &'a str) -> HashSet<&'a str> {
    let g = dependency_graph(graph);
    let mut visited = HashSet::new();
    if !g.contains_node(start) {
        return visited;
    }
    let reversed = Reversed(&g);
    let mut dfs = Dfs::new(reversed, start);
    while let Some(node) = dfs.next(reversed) {
        visited.insert(node);
    }
    visited
}

/// The dependencies evaluation actually descends into. Variables only read
/// their column (attached Modelling nodes are metadata) and the root only
/// evaluates its Merge input.
pub fn evaluated_dependencies<'a>(graph: &'a GraphSpec, node: &'a NodeSpec) -> Vec<&'a str> {
    match node.kind {
        NodeKind::Transformation { .. } | NodeKind::Mixer { .. } | NodeKind::Merge => {
            node.dependencies.iter().map(String::as_str).collect()
        }
        NodeKind::DependentVariable { .. } => node
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|d| matches!(graph.get(d).map(|n| &n.kind), Some(NodeKind::Merge)))
            .collect(),
        NodeKind::IndependentVariable { .. } | NodeKind::Constant { .. } | NodeKind::Modelling { .. } => Vec::new(),
    }
}

/// How many times each node is reached by an uncached recursive evaluation
/// from `root` (the number of distinct evaluation paths).
pub fn path_counts<'a>(graph: &'a GraphSpec, root: &'a str) -> Result<HashMap<&'a str, usize>> {
    let order = sort(graph)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    counts.insert(root, 1);

    // Consumers before dependencies.
    for key in order.into_iter().rev() {
        let Some(&here) = counts.get(key) else { continue };
        let node = graph.node(key)?;
        for dep in evaluated_dependencies(graph, node) {
            *counts.entry(dep).or_insert(0) += here;
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MixerOp, NodeSpec, TransformMethod};

    fn diamond() -> GraphSpec {
        // x feeds both branches of the mixer, which feeds the merge twice.
        let mut g = GraphSpec::new();
        g.insert("x", NodeSpec::new(NodeKind::IndependentVariable { column: "A".into() }, &[]));
        g.insert("sq", NodeSpec::new(NodeKind::Transformation { method: TransformMethod::Power { exponent: 2.0 } }, &["x"]));
        g.insert("mix", NodeSpec::new(NodeKind::Mixer { operator: MixerOp::Add }, &["x", "sq"]));
        g.insert("m", NodeSpec::new(NodeKind::Merge, &["mix", "mix"]));
        g.insert("y", NodeSpec::new(NodeKind::DependentVariable { column: "B".into() }, &["m"]));
        g
    }

    #[test]
    fn test_sort_puts_dependencies_first() {
        let g = diamond();
        let order = sort(&g).unwrap();
        let pos = |k: &str| order.iter().position(|&x| x == k).unwrap();
        assert!(pos("x") < pos("sq"));
        assert!(pos("sq") < pos("mix"));
        assert!(pos("mix") < pos("m"));
        assert!(pos("m") < pos("y"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut g = diamond();
        g.insert("x", NodeSpec::new(NodeKind::Transformation { method: TransformMethod::Identity }, &["mix"]));
        assert!(matches!(sort(&g), Err(ForecastError::CycleDetected(_))));
    }

    #[test]
    fn test_upstream_from() {
        let g = diamond();
        let up = upstream_from(&g, "mix");
        assert_eq!(up, ["mix", "sq", "x"].into_iter().collect());
        assert!(upstream_from(&g, "ghost").is_empty());
    }

    #[test]
    fn test_path_counts_multiply_through_shared_nodes() {
        let g = diamond();
        let counts = path_counts(&g, "y").unwrap();
        assert_eq!(counts["m"], 1);
        assert_eq!(counts["mix"], 2);
        assert_eq!(counts["sq"], 2);
        // Directly from mix and again through sq, on both merge paths.
        assert_eq!(counts["x"], 4);
    }
}
