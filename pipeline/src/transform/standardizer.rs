//! Numeric standardization: reconcile mixed percent/plain columns.
//!
//! Source data mixes `45%` and `45` in the same column; both name the
//! same quantity and differ only in decoration. Detection is
//! column-wide: one percent-formatted value switches the whole column to
//! bare numbers. No `/100` scaling is performed.

use crate::models::{Cell, Dataset};
use crate::logging::log_info;

/// Normalize every column that mixes percent-formatted and plain values.
///
/// Columns without a percent value pass through unchanged. Text that is
/// neither numeric nor percent-formatted is left for the imputer to
/// treat as missing.
pub fn standardize(mut dataset: Dataset) -> Dataset {
    let percent_columns: Vec<String> = dataset
        .columns
        .iter()
        .filter(|col| dataset.column_cells(col).any(is_percent))
        .cloned()
        .collect();

    for col in &percent_columns {
        log_info(format!("Normalizing percent-formatted column '{}'", col));
        for row in &mut dataset.rows {
            let parsed = row.get(col.as_str()).and_then(parse_percent_or_number);
            if let Some(n) = parsed {
                row.insert(col.clone(), Cell::Number(n));
            }
        }
    }

    dataset
}

/// Whether the cell is a percent-formatted numeric string.
fn is_percent(cell: &Cell) -> bool {
    match cell {
        Cell::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .strip_suffix('%')
                .map(|body| body.trim().parse::<f64>().is_ok())
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Numeric value of a cell in a percent-normalized column: the percent
/// suffix is stripped, the magnitude is kept as-is.
fn parse_percent_or_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => {
            let trimmed = s.trim();
            let body = trimmed.strip_suffix('%').map(str::trim).unwrap_or(trimmed);
            body.parse::<f64>().ok()
        }
        _ => None,
    }
}
