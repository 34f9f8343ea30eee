//! ledger.rs
//! Evaluation results and the optional node-result cache.

use crate::data::{Table, TableIdentity};
use crate::error::{ForecastError, Result};
use crate::store::{ModelMethod, NodeKey};
use std::collections::HashMap;
use std::sync::Arc;

/// One column's worth of values aligned to the evaluated table's rows.
pub type Series = Arc<Vec<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    Series(Series),
    /// Ordered feature list produced by a Merge.
    SeriesList(Vec<Series>),
    Target(TargetBundle),
}

/// The root's output: target column, generated feature columns and the
/// table augmented with them.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBundle {
    pub target: String,
    /// `Feature 1..N`, in merge order.
    pub features: Vec<String>,
    /// The regression method attached to the root, if any.
    pub model: Option<ModelMethod>,
    pub data: Table,
}

impl EvaluationResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            EvaluationResult::Series(_) => "Series",
            EvaluationResult::SeriesList(_) => "SeriesList",
            EvaluationResult::Target(_) => "Target",
        }
    }

    pub fn into_series(self, node: &str) -> Result<Series> {
        match self {
            EvaluationResult::Series(s) => Ok(s),
            other => Err(ForecastError::InvalidParameter {
                node: node.to_string(),
                message: format!("expected a Series input, got {}", other.kind_name()),
            }),
        }
    }
}

/// Node results cached for one table revision. Looking up against a
/// different table identity misses; inserting for a new identity drops
/// everything cached for the old one.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    table: Option<TableIdentity>,
    values: HashMap<NodeKey, EvaluationResult>,
    hits: usize,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
    pub fn hits(&self) -> usize { self.hits }

    pub fn get(&mut self, key: &str, table: TableIdentity) -> Option<EvaluationResult> {
        if self.table != Some(table) {
            return None;
        }
        let found = self.values.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    /// Read-only view of a cached value regardless of table identity.
    pub fn peek(&self, key: &str) -> Option<&EvaluationResult> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: &str, table: TableIdentity, value: EvaluationResult) {
        if self.table != Some(table) {
            self.values.clear();
            self.table = Some(table);
        }
        self.values.insert(key.to_string(), value);
    }

    pub fn invalidate<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.values.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.table = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_cache_is_scoped_to_table_revision() {
        let mut table = Table::new(vec![NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()]);
        let mut ledger = Ledger::new();
        let value = EvaluationResult::Series(Arc::new(vec![1.0]));

        ledger.insert("x", table.identity(), value.clone());
        assert_eq!(ledger.get("x", table.identity()), Some(value));
        assert_eq!(ledger.hits(), 1);

        table.set_column("A", vec![2.0]).unwrap();
        assert_eq!(ledger.get("x", table.identity()), None);

        ledger.insert("y", table.identity(), EvaluationResult::SeriesList(vec![]));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.peek("x").is_none());
    }

    #[test]
    fn test_invalidate_removes_keys() {
        let table = Table::new(vec![]);
        let mut ledger = Ledger::new();
        ledger.insert("a", table.identity(), EvaluationResult::SeriesList(vec![]));
        ledger.insert("b", table.identity(), EvaluationResult::SeriesList(vec![]));
        ledger.invalidate(["a"]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.peek("b").is_some());
    }
}
