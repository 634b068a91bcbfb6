//! Domain models for the cohortprep transformation pipeline.
//!
//! This module contains the core data structures threaded through the
//! pipeline stages:
//!
//! - [`Cell`] - a single cell value (missing, number, text, or sub-records)
//! - [`SubRecord`] - one entry of an aggregated list-valued field
//! - [`Row`] - an ordered mapping from column name to cell
//! - [`Dataset`] - the full table, column set shared by all rows
//!
//! Column order and row order are contractual (first-appearance order
//! survives aggregation, policies run in document order), so all maps
//! here are [`IndexMap`]s.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// Cell
// =============================================================================

/// One entry of an aggregated list-valued field, e.g. a single detected
/// gene with its renamed sub-fields.
pub type SubRecord = IndexMap<String, Cell>;

/// A single cell value.
///
/// Serialized untagged: `Missing` is JSON `null`, numbers and strings are
/// bare scalars, and an aggregated field is an array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// The designated missing marker.
    Missing,
    /// A numeric value. All numerics are carried as f64, matching the
    /// loader's coercion.
    Number(f64),
    /// A textual value (including not-yet-standardized numerics like "45%").
    Text(String),
    /// An aggregated list-valued field (ordered sub-records).
    Records(Vec<SubRecord>),
}

impl Cell {
    /// Whether this cell is the missing marker.
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric view of the cell. `Number` returns its value; `Text`
    /// parses when it is a plain numeric string. Everything else is None.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Textual view of the cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Sub-record view of an aggregated field.
    pub fn as_records(&self) -> Option<&[SubRecord]> {
        match self {
            Cell::Records(r) => Some(r.as_slice()),
            _ => None,
        }
    }

    /// Short display form used in log and error context.
    pub fn display(&self) -> String {
        match self {
            Cell::Missing => "<missing>".to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Cell::Text(s) => s.clone(),
            Cell::Records(r) => format!("[{} records]", r.len()),
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

// =============================================================================
// Row / Dataset
// =============================================================================

/// One row: ordered mapping from column name to cell value.
pub type Row = IndexMap<String, Cell>;

/// The in-memory table. Every row carries a value (possibly `Missing`)
/// for every declared column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Declared column names, in order.
    pub columns: Vec<String>,
    /// Rows in original order.
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Create an empty dataset with the given column set.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Append a row, filling any absent declared column with `Missing`.
    pub fn push_row(&mut self, mut row: Row) {
        for col in &self.columns {
            if !row.contains_key(col) {
                row.insert(col.clone(), Cell::Missing);
            }
        }
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column is declared.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cell at (row index, column), `Missing` if the column is absent.
    pub fn cell(&self, row_idx: usize, column: &str) -> &Cell {
        self.rows[row_idx].get(column).unwrap_or(&Cell::Missing)
    }

    /// Iterate one column's cells across all rows.
    pub fn column_cells<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Cell> + 'a {
        self.rows.iter().map(move |row| row.get(column).unwrap_or(&Cell::Missing))
    }

    /// Declare a new column and set its value on every row.
    ///
    /// The values slice must have one entry per row.
    pub fn add_column(&mut self, name: &str, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(name.to_string(), value);
        }
    }

    /// Remove columns by name, from the declaration and every row.
    pub fn remove_columns(&mut self, names: &[String]) {
        self.columns.retain(|c| !names.contains(c));
        for row in &mut self.rows {
            row.retain(|k, _| !names.contains(k));
        }
    }

    /// Keep only rows matching the predicate.
    pub fn retain_rows<F: FnMut(&Row) -> bool>(&mut self, pred: F) {
        self.rows.retain(pred);
    }

    /// Identifier value of a row for log/error context.
    pub fn row_id(&self, row: &Row, id_column: &str) -> String {
        row.get(id_column).map(Cell::display).unwrap_or_else(|| "?".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
