//! Composable row filters over table columns and the `Time` column.
//!
//! A filter evaluates to a boolean mask aligned with the table's rows.
//! Comparisons against a missing value are false, as in the usual NaN rules.

use super::table::{Table, TIME};
use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A comparison operand: either a number or a date (for the `Time` column).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Number(f64),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Geq(Bound),
    Gt(Bound),
    Leq(Bound),
    Lt(Bound),
    Eq(Bound),
    Neq(Bound),
    /// Inclusive on both ends.
    Between(Bound, Bound),
    In(Vec<Bound>),
    NotIn(Vec<Bound>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Column { column: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn column(column: impl Into<String>, condition: Condition) -> Self {
        Filter::Column { column: column.into(), condition }
    }

    /// `Time` between `start` and `end`, both inclusive.
    pub fn time_between(start: NaiveDate, end: NaiveDate) -> Self {
        Filter::column(TIME, Condition::Between(Bound::Date(start), Bound::Date(end)))
    }

    pub fn mask(&self, table: &Table) -> Result<Vec<bool>> {
        match self {
            Filter::Column { column, condition } => column_mask(table, column, condition),
            Filter::And(parts) => {
                let mut mask = vec![true; table.len()];
                for part in parts {
                    for (m, p) in mask.iter_mut().zip(part.mask(table)?) {
                        *m &= p;
                    }
                }
                Ok(mask)
            }
            Filter::Or(parts) => {
                let mut mask = vec![false; table.len()];
                for part in parts {
                    for (m, p) in mask.iter_mut().zip(part.mask(table)?) {
                        *m |= p;
                    }
                }
                Ok(mask)
            }
        }
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        Ok(table.filter(&self.mask(table)?))
    }
}

fn column_mask(table: &Table, column: &str, condition: &Condition) -> Result<Vec<bool>> {
    if column == TIME {
        let key = |b: &Bound| match b {
            Bound::Date(d) => Some(d.num_days_from_ce() as f64),
            Bound::Number(_) => None,
        };
        let values: Vec<f64> = table.time().iter().map(|d| d.num_days_from_ce() as f64).collect();
        return Ok(values.iter().map(|&v| holds(v, condition, &key)).collect());
    }

    let key = |b: &Bound| match b {
        Bound::Number(n) => Some(*n),
        Bound::Date(_) => None,
    };
    let values = table.require_column(column)?;
    Ok(values.iter().map(|&v| holds(v, condition, &key)).collect())
}

fn holds(v: f64, condition: &Condition, key: &dyn Fn(&Bound) -> Option<f64>) -> bool {
    // NaN compares false everywhere, and a bound of the wrong type never matches.
    let cmp = |b: &Bound, f: fn(f64, f64) -> bool| key(b).map_or(false, |x| f(v, x));
    match condition {
        Condition::Geq(b) => cmp(b, |v, x| v >= x),
        Condition::Gt(b) => cmp(b, |v, x| v > x),
        Condition::Leq(b) => cmp(b, |v, x| v <= x),
        Condition::Lt(b) => cmp(b, |v, x| v < x),
        Condition::Eq(b) => cmp(b, |v, x| v == x),
        Condition::Neq(b) => key(b).map_or(false, |x| !v.is_nan() && v != x),
        Condition::Between(lo, hi) => cmp(lo, |v, x| v >= x) && cmp(hi, |v, x| v <= x),
        Condition::In(set) => set.iter().any(|b| cmp(b, |v, x| v == x)),
        Condition::NotIn(set) => !v.is_nan() && !set.iter().any(|b| cmp(b, |v, x| v == x)),
    }
}
