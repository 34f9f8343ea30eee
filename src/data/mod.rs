//! Time-indexed tabular data and row filters.
pub mod filter;
pub mod table;

pub use filter::{Bound, Condition, Filter};
pub use table::{Column, Table, TableIdentity, MISSING, TIME, TIME_INDEX};
