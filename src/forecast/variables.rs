//! variables.rs
//! Which columns the roll-forward has to fill in, and how.

use crate::analysis::topology;
use crate::data::TIME_INDEX;
use crate::error::Result;
use crate::store::{GraphSpec, ModelMethod, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRole {
    Independent,
    /// The forecast target. Its future values are the predictions themselves.
    Dependent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub column: String,
    pub role: VariableRole,
    /// The Modelling method attached to the variable, if any.
    pub method: Option<ModelMethod>,
}

/// Collects one descriptor per column read by the root's evaluation.
///
/// Nodes are scanned in key order and the first node that carries a
/// Modelling method decides the method for its column. Any variable reading
/// the target column is treated as the target. `TimeIndex` is left out: it
/// is filled positionally.
pub fn extract_variables(graph: &GraphSpec) -> Result<Vec<VariableDescriptor>> {
    let (root, target) = graph.root()?;
    let reachable = topology::upstream_from(graph, root);

    let mut out: Vec<VariableDescriptor> = Vec::new();
    for (key, node) in graph.iter() {
        if !reachable.contains(key) {
            continue;
        }
        let Some(column) = node.kind.variable_column() else { continue };
        if column == TIME_INDEX {
            continue;
        }

        let method = node.dependencies.iter().find_map(|dep| match graph.get(dep).map(|n| &n.kind) {
            Some(NodeKind::Modelling { method }) => Some(*method),
            _ => None,
        });
        let role = if column == target { VariableRole::Dependent } else { VariableRole::Independent };

        match out.iter_mut().find(|v| v.column == column) {
            Some(existing) => {
                if existing.method.is_none() {
                    existing.method = method;
                }
            }
            None => out.push(VariableDescriptor { column: column.to_string(), role, method }),
        }
    }
    Ok(out)
}
