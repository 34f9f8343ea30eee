//! trace.rs
//! Indented audit rendering of a graph from its root. A node reached again
//! prints a reference to the level where it was first shown.

use crate::compute::{EvaluationResult, Ledger};
use crate::error::Result;
use crate::store::{GraphSpec, MixerOp, NodeKind, NodeSpec};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the tree under the graph's root. With a ledger, cached node
/// values are printed next to each node.
pub fn format_trace(graph: &GraphSpec, ledger: Option<&Ledger>) -> Result<String> {
    let (root, target) = graph.root()?;
    let mut tracer = Tracer { graph, ledger, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "AUDIT TRACE for '{}' (target '{}'):", root, target);
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_node(root, 1, "");
    Ok(tracer.output)
}

struct Tracer<'a> {
    graph: &'a GraphSpec,
    ledger: Option<&'a Ledger>,
    visited_at_level: HashMap<&'a str, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, key: &'a str, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(key) {
            let _ = writeln!(self.output, "{}-> {} (Ref to L{})", prefix, key, first_seen);
            return;
        }
        self.visited_at_level.insert(key, level);

        let Some(node) = self.graph.get(key) else {
            let _ = writeln!(self.output, "{}[L{}] {} [missing]", prefix, level, key);
            return;
        };
        let line_header = format!("[L{}] {}{}", level, key, self.format_value(key));

        match &node.kind {
            NodeKind::IndependentVariable { column } => {
                let _ = writeln!(self.output, "{}{} -> Var({})", prefix, line_header, column);
            }
            NodeKind::DependentVariable { column } => {
                let _ = writeln!(self.output, "{}{} = Target({})", prefix, line_header, column);
            }
            NodeKind::Constant { value } => {
                let _ = writeln!(self.output, "{}{} -> Const[{:.3}]", prefix, line_header, value);
            }
            NodeKind::Modelling { method } => {
                let _ = writeln!(self.output, "{}{} -> Model({})", prefix, line_header, method);
            }
            NodeKind::Transformation { method } => {
                let input = node.dependencies.first().map_or("?", String::as_str);
                let _ = writeln!(self.output, "{}{} = {}({})", prefix, line_header, method.name(), input);
            }
            NodeKind::Mixer { operator } => {
                let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, format_mixer(*operator, node));
            }
            NodeKind::Merge => {
                let _ = writeln!(self.output, "{}{} = Merge[{}]", prefix, line_header, node.dependencies.len());
            }
        }
        self.recurse_children(prefix, &node.dependencies, level);
    }

    fn recurse_children(&mut self, prefix: &str, children: &'a [String], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            self.trace_node(child, level + 1, &full_prefix);
        }
    }

    fn format_value(&self, key: &str) -> String {
        match self.ledger.and_then(|l| l.peek(key)) {
            Some(EvaluationResult::Series(s)) => match s.len() {
                0 => " [len=0]".to_string(),
                1 => format!(" [{:.3}]", s[0]),
                _ => format!(" [{:.3}, ...]", s[0]),
            },
            Some(EvaluationResult::SeriesList(list)) => format!(" [{} series]", list.len()),
            Some(EvaluationResult::Target(bundle)) => format!(" [{} features]", bundle.features.len()),
            None => String::new(),
        }
    }
}

fn format_mixer(operator: MixerOp, node: &NodeSpec) -> String {
    let sym = match operator {
        MixerOp::Add => "+",
        MixerOp::Subtract => "-",
        MixerOp::Multiply => "*",
        MixerOp::Divide => "/",
    };
    if node.dependencies.is_empty() {
        return sym.to_string();
    }
    let separator = format!(" {} ", sym);
    node.dependencies.join(separator.as_str())
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
