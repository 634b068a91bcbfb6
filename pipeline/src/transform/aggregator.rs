//! Row aggregation: collapse the rows sharing an identifier into one.
//!
//! Source spreadsheets carry one row per sub-record (e.g. one per
//! detected gene), with the subject's other columns repeated or left
//! blank under a vertically merged cell. This stage folds each subject's
//! rows into a single row whose configured aggregate fields hold an
//! ordered list of sub-records.
//!
//! ```text
//! Input (flat rows)                 Output (one row per subject)
//! ┌──────────────────────────┐      ┌───────────────────────────────┐
//! │ UR: 12, Gene: TP53, ...  │      │ UR: 12                        │
//! │ UR: 12, Gene: DNMT3A,... │  →   │ Gene: [TP53, DNMT3A]          │
//! │ UR: 15, Gene: FLT3, ...  │      ├───────────────────────────────┤
//! └──────────────────────────┘      │ UR: 15, Gene: [FLT3]          │
//!                                   └───────────────────────────────┘
//! ```

use indexmap::IndexMap;

use crate::config::{AggregateRule, CleansingConfig};
use crate::error::{ConfigError, PipelineResult};
use crate::logging::{log_success, log_warning};
use crate::models::{Cell, Dataset, Row, SubRecord};

/// Collapse rows sharing the identifier into one row per subject.
///
/// Group order is the identifier's first appearance. Non-aggregated
/// columns keep the first row's values; rows beyond the first contribute
/// only to the aggregated fields. A single-row group still yields a
/// one-element list.
pub fn aggregate(dataset: Dataset, config: &CleansingConfig) -> PipelineResult<Dataset> {
    let id_column = &config.id_column;
    if !dataset.has_column(id_column) {
        return Err(ConfigError::UnknownColumn {
            stage: "aggregation".into(),
            column: id_column.clone(),
        }
        .into());
    }

    let rows = forward_fill_id(dataset.rows, id_column);

    // Group by identifier, first-appearance order.
    let mut groups: IndexMap<String, Vec<Row>> = IndexMap::new();
    let mut dropped = 0usize;
    for row in rows {
        let id = row.get(id_column).cloned().unwrap_or(Cell::Missing);
        if id.is_missing() {
            // No identifier even after forward-fill (leading rows).
            dropped += 1;
            continue;
        }
        groups.entry(id.display()).or_default().push(row);
    }
    if dropped > 0 {
        log_warning(format!("{} rows without an identifier were dropped", dropped));
    }

    let columns = output_columns(&dataset.columns, &config.aggregate);

    let mut output = Dataset::new(columns.clone());
    for (_, group) in groups {
        let mut row = Row::new();

        // Representative values come from the first row of the group.
        let first = &group[0];
        for col in &columns {
            if config.aggregate.iter().any(|r| &r.aggregate_column == col) {
                continue;
            }
            row.insert(col.clone(), first.get(col).cloned().unwrap_or(Cell::Missing));
        }

        for rule in &config.aggregate {
            let records = collect_sub_records(&group, rule);
            row.insert(rule.aggregate_column.clone(), Cell::Records(records));
        }

        // Rebuild in declared column order.
        let mut ordered = Row::new();
        for col in &columns {
            ordered.insert(col.clone(), row.get(col).cloned().unwrap_or(Cell::Missing));
        }
        output.push_row(ordered);
    }

    log_success(format!(
        "Aggregated into {} subjects ({} aggregate fields)",
        output.len(),
        config.aggregate.len()
    ));

    Ok(output)
}

/// Forward-fill the identifier column: a vertically merged spreadsheet
/// cell leaves continuation rows blank, which belong to the subject
/// above them.
fn forward_fill_id(mut rows: Vec<Row>, id_column: &str) -> Vec<Row> {
    let mut last: Option<Cell> = None;
    for row in &mut rows {
        let current = row.get(id_column).cloned().unwrap_or(Cell::Missing);
        if current.is_missing() {
            if let Some(ref value) = last {
                row.insert(id_column.to_string(), value.clone());
            }
        } else {
            last = Some(current);
        }
    }
    rows
}

/// One sub-record per group row, fields renamed per the rule's mapping.
fn collect_sub_records(group: &[Row], rule: &AggregateRule) -> Vec<SubRecord> {
    let mut records = Vec::with_capacity(group.len());
    for row in group {
        if rule.skip_empty {
            let primary = rule
                .column_mapping
                .first()
                .and_then(|m| row.get(&m.old_name))
                .cloned()
                .unwrap_or(Cell::Missing);
            if is_empty_or_zero(&primary) {
                continue;
            }
        }

        let mut record = SubRecord::new();
        for mapping in &rule.column_mapping {
            let value = row.get(&mapping.old_name).cloned().unwrap_or(Cell::Missing);
            record.insert(mapping.new_name.clone(), value);
        }
        records.push(record);
    }
    records
}

/// Missing, numeric zero, or the literal string "0".
fn is_empty_or_zero(cell: &Cell) -> bool {
    match cell {
        Cell::Missing => true,
        Cell::Number(n) => *n == 0.0,
        Cell::Text(s) => s.trim() == "0",
        Cell::Records(_) => false,
    }
}

/// The post-aggregation column set: source columns consumed by a mapping
/// disappear; each aggregate field sits where its namesake column was,
/// or is appended when the name is new.
fn output_columns(original: &[String], rules: &[AggregateRule]) -> Vec<String> {
    let consumed = consumed_columns(rules);

    let mut columns = Vec::with_capacity(original.len());
    for col in original {
        if rules.iter().any(|r| &r.aggregate_column == col) {
            columns.push(col.clone());
        } else if !consumed.contains(col) {
            columns.push(col.clone());
        }
    }
    for rule in rules {
        if !columns.contains(&rule.aggregate_column) {
            columns.push(rule.aggregate_column.clone());
        }
    }
    columns
}

/// All source columns folded into some aggregate field.
fn consumed_columns(rules: &[AggregateRule]) -> Vec<String> {
    rules
        .iter()
        .flat_map(|r| r.column_mapping.iter().map(|m| m.old_name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;

    fn gene_rule(skip_empty: bool) -> CleansingConfig {
        CleansingConfig {
            id_column: "UR".into(),
            aggregate: vec![AggregateRule {
                aggregate_column: "Gene".into(),
                column_mapping: vec![
                    ColumnMapping { old_name: "Gene".into(), new_name: "name".into() },
                    ColumnMapping { old_name: "VAF% G1".into(), new_name: "VAF% G1".into() },
                ],
                skip_empty,
            }],
        }
    }

    fn row(ur: &str, gene: Cell, vaf: Cell, ferritin: Cell) -> Row {
        let mut r = Row::new();
        r.insert("UR".into(), if ur.is_empty() { Cell::Missing } else { Cell::Text(ur.into()) });
        r.insert("Gene".into(), gene);
        r.insert("VAF% G1".into(), vaf);
        r.insert("Ferritin".into(), ferritin);
        r
    }

    fn dataset(rows: Vec<Row>) -> Dataset {
        let mut ds = Dataset::new(vec![
            "UR".into(),
            "Gene".into(),
            "VAF% G1".into(),
            "Ferritin".into(),
        ]);
        for r in rows {
            ds.push_row(r);
        }
        ds
    }

    #[test]
    fn test_n_rows_one_subject_n_entries() {
        let ds = dataset(vec![
            row("UR-1", Cell::Text("TP53".into()), Cell::Number(41.0), Cell::Number(350.0)),
            row("UR-1", Cell::Text("DNMT3A".into()), Cell::Number(12.0), Cell::Missing),
            row("UR-1", Cell::Text("FLT3".into()), Cell::Number(8.0), Cell::Missing),
        ]);

        let out = aggregate(ds, &gene_rule(false)).unwrap();
        assert_eq!(out.len(), 1);

        let records = out.rows[0]["Gene"].as_records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["name"], Cell::Text("TP53".into()));
        assert_eq!(records[1]["name"], Cell::Text("DNMT3A".into()));
        assert_eq!(records[2]["name"], Cell::Text("FLT3".into()));
    }

    #[test]
    fn test_single_row_group_still_a_list() {
        let ds = dataset(vec![row(
            "UR-1",
            Cell::Text("TP53".into()),
            Cell::Number(41.0),
            Cell::Number(350.0),
        )]);

        let out = aggregate(ds, &gene_rule(false)).unwrap();
        let records = out.rows[0]["Gene"].as_records().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_first_row_wins_for_plain_columns() {
        // Ferritin is null on the first row and present on the second;
        // the first row is the representative, so it stays null.
        let ds = dataset(vec![
            row("UR-1", Cell::Text("TP53".into()), Cell::Number(41.0), Cell::Missing),
            row("UR-1", Cell::Text("FLT3".into()), Cell::Number(8.0), Cell::Number(900.0)),
        ]);

        let out = aggregate(ds, &gene_rule(false)).unwrap();
        assert!(out.rows[0]["Ferritin"].is_missing());
    }

    #[test]
    fn test_forward_fill_identifier() {
        let ds = dataset(vec![
            row("UR-1", Cell::Text("TP53".into()), Cell::Number(41.0), Cell::Number(350.0)),
            row("", Cell::Text("DNMT3A".into()), Cell::Number(12.0), Cell::Missing),
            row("UR-2", Cell::Text("FLT3".into()), Cell::Number(8.0), Cell::Number(120.0)),
        ]);

        let out = aggregate(ds, &gene_rule(false)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows[0]["Gene"].as_records().unwrap().len(), 2);
        assert_eq!(out.rows[1]["Gene"].as_records().unwrap().len(), 1);
    }

    #[test]
    fn test_skip_empty_drops_zero_genes() {
        let ds = dataset(vec![
            row("UR-1", Cell::Text("0".into()), Cell::Missing, Cell::Number(350.0)),
            row("UR-2", Cell::Text("TP53".into()), Cell::Number(41.0), Cell::Number(120.0)),
            row("UR-2", Cell::Missing, Cell::Missing, Cell::Missing),
        ]);

        let out = aggregate(ds, &gene_rule(true)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows[0]["Gene"].as_records().unwrap().len(), 0);
        assert_eq!(out.rows[1]["Gene"].as_records().unwrap().len(), 1);
    }

    #[test]
    fn test_consumed_columns_removed_and_order_kept() {
        let ds = dataset(vec![
            row("UR-2", Cell::Text("FLT3".into()), Cell::Number(8.0), Cell::Number(120.0)),
            row("UR-1", Cell::Text("TP53".into()), Cell::Number(41.0), Cell::Number(350.0)),
        ]);

        let out = aggregate(ds, &gene_rule(false)).unwrap();
        // VAF% G1 was folded into Gene; Gene keeps its position.
        assert_eq!(out.columns, ["UR", "Gene", "Ferritin"]);
        // First appearance order: UR-2 before UR-1.
        assert_eq!(out.rows[0]["UR"], Cell::Text("UR-2".into()));
        assert_eq!(out.rows[1]["UR"], Cell::Text("UR-1".into()));
    }

    #[test]
    fn test_unknown_id_column_fails() {
        let ds = dataset(vec![row(
            "UR-1",
            Cell::Text("TP53".into()),
            Cell::Number(41.0),
            Cell::Missing,
        )]);
        let config = CleansingConfig { id_column: "Patient".into(), aggregate: vec![] };
        assert!(aggregate(ds, &config).is_err());
    }
}
