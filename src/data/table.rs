//! table.rs
//! Column-oriented, time-indexed table. Missing values are stored as NaN.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU64, Ordering};

pub const TIME: &str = "Time";
pub const TIME_INDEX: &str = "TimeIndex";

/// The missing-value sentinel. Lookups that find no row return it, and it
/// propagates through arithmetic.
pub const MISSING: f64 = f64::NAN;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_table_id() -> u64 {
    NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies a table instance at a particular revision. Any column write
/// bumps the revision, so cached node results keyed by this go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    pub id: u64,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug)]
pub struct Table {
    id: u64,
    revision: u64,
    time: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl Clone for Table {
    /// A clone is a new instance with its own identity.
    fn clone(&self) -> Self {
        Self {
            id: next_table_id(),
            revision: 0,
            time: self.time.clone(),
            columns: self.columns.clone(),
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.columns == other.columns
    }
}

impl Table {
    pub fn new(time: Vec<NaiveDate>) -> Self {
        Self { id: next_table_id(), revision: 0, time, columns: Vec::new() }
    }

    /// Builder-style column insertion.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Replaces the named column, or appends it if absent.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if name == TIME {
            return Err(ForecastError::InvalidData("'Time' is not a numeric column".into()));
        }
        if values.len() != self.time.len() {
            return Err(ForecastError::LengthMismatch {
                column: name,
                expected: self.time.len(),
                actual: values.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => self.columns.push(Column { name, values }),
        }
        self.revision += 1;
        Ok(())
    }

    // --- Accessors ---

    pub fn identity(&self) -> TableIdentity {
        TableIdentity { id: self.id, revision: self.revision }
    }

    pub fn len(&self) -> usize { self.time.len() }
    pub fn is_empty(&self) -> bool { self.time.is_empty() }
    pub fn time(&self) -> &[NaiveDate] { &self.time }
    pub fn columns(&self) -> &[Column] { &self.columns }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.values.as_slice())
    }

    pub fn require_column(&self, name: &str) -> Result<&[f64]> {
        self.column(name).ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    /// Position of the first row stamped `date`.
    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        self.time.iter().position(|&t| t == date)
    }

    /// The value of `column` on the first row stamped `date`, or [`MISSING`].
    pub fn value_at(&self, date: NaiveDate, column: &str) -> f64 {
        match (self.position_of(date), self.column(column)) {
            (Some(row), Some(values)) => values[row],
            _ => MISSING,
        }
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.time.last().copied()
    }

    // --- Row selection ---

    /// Keeps `Time` plus the listed columns, in the listed order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let mut out = Table::new(self.time.clone());
        for name in names {
            let name = name.as_ref();
            out.set_column(name, self.require_column(name)?.to_vec())?;
        }
        Ok(out)
    }

    pub fn filter(&self, mask: &[bool]) -> Table {
        let keep: Vec<usize> = mask.iter().enumerate().filter(|(_, &k)| k).map(|(i, _)| i).collect();
        self.take(&keep)
    }

    /// Rows whose `Time` is at or before `date`.
    pub fn up_to(&self, date: NaiveDate) -> Table {
        let mask: Vec<bool> = self.time.iter().map(|&t| t <= date).collect();
        self.filter(&mask)
    }

    pub fn tail(&self, n: usize) -> Table {
        let start = self.len().saturating_sub(n);
        self.take(&(start..self.len()).collect::<Vec<_>>())
    }

    /// Drops rows with a missing value in any of `names`.
    pub fn drop_missing<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let cols: Vec<&[f64]> = names
            .iter()
            .map(|n| self.require_column(n.as_ref()))
            .collect::<Result<_>>()?;
        let mask: Vec<bool> = (0..self.len())
            .map(|row| cols.iter().all(|c| !c[row].is_nan()))
            .collect();
        Ok(self.filter(&mask))
    }

    fn take(&self, rows: &[usize]) -> Table {
        let mut out = Table::new(rows.iter().map(|&r| self.time[r]).collect());
        out.columns = self
            .columns
            .iter()
            .map(|c| Column { name: c.name.clone(), values: rows.iter().map(|&r| c.values[r]).collect() })
            .collect();
        out
    }

    // --- Row construction ---

    /// Appends one row. Columns not named in `values` are filled with
    /// [`MISSING`]; names the table does not have yet are rejected.
    pub fn push_row(&mut self, date: NaiveDate, values: &[(&str, f64)]) -> Result<()> {
        if let Some((name, _)) = values.iter().find(|(n, _)| !self.has_column(n)) {
            return Err(ForecastError::MissingColumn(name.to_string()));
        }
        self.time.push(date);
        for col in &mut self.columns {
            let v = values.iter().find(|(n, _)| *n == col.name).map(|(_, v)| *v).unwrap_or(MISSING);
            col.values.push(v);
        }
        self.revision += 1;
        Ok(())
    }

    /// The `(column, value)` pairs of one row.
    pub fn row(&self, row: usize) -> Vec<(&str, f64)> {
        self.columns.iter().map(|c| (c.name.as_str(), c.values[row])).collect()
    }

    /// Appends every row of `other`, matching columns by name.
    pub fn append(&mut self, other: &Table) -> Result<()> {
        for row in 0..other.len() {
            self.push_row(other.time[row], &other.row(row))?;
        }
        Ok(())
    }

    /// Checks that `TimeIndex` is present and rises by exactly one per row.
    pub fn check_time_index(&self) -> Result<()> {
        let index = self.require_column(TIME_INDEX)?;
        for (row, pair) in index.windows(2).enumerate() {
            if pair[1] - pair[0] != 1.0 {
                return Err(ForecastError::InvalidData(format!(
                    "TimeIndex is not contiguous at row {} ({} -> {})",
                    row + 1,
                    pair[0],
                    pair[1]
                )));
            }
        }
        if index.iter().any(|v| v.is_nan() || v.fract() != 0.0) {
            return Err(ForecastError::InvalidData("TimeIndex must hold integer positions".into()));
        }
        Ok(())
    }
}
