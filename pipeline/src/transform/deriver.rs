//! Derived-column computation.
//!
//! Rules run in configured order over the post-imputation dataset and
//! each appends one new column. Later rules may read columns produced by
//! earlier ones (the config layer rejects the reverse direction).
//!
//! Three rule kinds, dispatched on the `method` tag:
//!
//! - `Count`: length of an aggregated list field
//! - `mapping`: ordered range buckets onto coded values, first match wins
//! - `conditional`: ordered multi-predicate clauses with a mandatory default
//!
//! `mapping` and `conditional` rules also record a coded-value → label
//! lookup so the report stage can print classes by name.

use indexmap::IndexMap;

use crate::config::{DerivationConfig, DeriveRule};
use crate::error::{ConfigError, DeriveError, PipelineResult};
use crate::logging::log_success;
use crate::models::{Cell, Dataset};

/// Coded value (display form) → human label for one derived column.
pub type LabelMap = IndexMap<String, String>;

/// Derived column name → label lookup.
pub type DerivedLabels = IndexMap<String, LabelMap>;

/// Compute every derived column, in configured order.
pub fn derive(
    mut dataset: Dataset,
    config: &DerivationConfig,
) -> PipelineResult<(Dataset, DerivedLabels)> {
    let mut labels = DerivedLabels::new();

    for rule in &config.columns {
        if dataset.has_column(rule.name()) && !rule.overwrite() {
            return Err(DeriveError::ColumnCollision(rule.name().to_string()).into());
        }

        match rule {
            DeriveRule::Count { name, base_column, .. } => {
                require_column(&dataset, base_column)?;
                let values: Vec<Cell> = dataset
                    .column_cells(base_column)
                    .map(|cell| {
                        let count = cell.as_records().map(<[_]>::len).unwrap_or(0);
                        Cell::Number(count as f64)
                    })
                    .collect();
                dataset.add_column(name, values);
            }

            DeriveRule::Mapping { name, base_column, map, .. } => {
                require_column(&dataset, base_column)?;
                let values: Vec<Cell> = dataset
                    .column_cells(base_column)
                    .map(|cell| match cell.as_number() {
                        Some(v) => map
                            .iter()
                            .find(|bucket| bucket.contains(v))
                            .map(|bucket| Cell::Number(bucket.int_value as f64))
                            .unwrap_or(Cell::Missing),
                        None => Cell::Missing,
                    })
                    .collect();
                dataset.add_column(name, values);

                let mut label_map = LabelMap::new();
                for bucket in map {
                    label_map
                        .entry(Cell::Number(bucket.int_value as f64).display())
                        .or_insert_with(|| bucket.label.clone());
                }
                labels.insert(name.clone(), label_map);
            }

            DeriveRule::Conditional { name, rules, default, .. } => {
                for clause in rules {
                    for column in clause.conditions.keys() {
                        require_column(&dataset, column)?;
                    }
                }

                let values: Vec<Cell> = dataset
                    .rows
                    .iter()
                    .map(|row| {
                        let matched = rules.iter().find(|clause| {
                            clause.conditions.iter().all(|(column, pred)| {
                                row.get(column)
                                    .and_then(Cell::as_number)
                                    .map(|v| pred.holds(v))
                                    .unwrap_or(false)
                            })
                        });
                        let outcome = matched.map(|c| &c.then).unwrap_or(default);
                        Cell::Number(outcome.value)
                    })
                    .collect();
                dataset.add_column(name, values);

                let mut label_map = LabelMap::new();
                for clause in rules {
                    label_map
                        .entry(Cell::Number(clause.then.value).display())
                        .or_insert_with(|| clause.then.label.clone());
                }
                label_map
                    .entry(Cell::Number(default.value).display())
                    .or_insert_with(|| default.label.clone());
                labels.insert(name.clone(), label_map);
            }
        }

        log_success(format!("Derived column '{}'", rule.name()));
    }

    Ok((dataset, labels))
}

fn require_column(dataset: &Dataset, column: &str) -> PipelineResult<()> {
    if dataset.has_column(column) {
        Ok(())
    } else {
        Err(ConfigError::UnknownColumn {
            stage: "derivation".into(),
            column: column.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Clause, MapBucket, Outcome, Predicate};
    use crate::models::{Row, SubRecord};

    fn dataset(columns: &[&str], rows: Vec<Vec<Cell>>) -> Dataset {
        let mut ds = Dataset::new(columns.iter().map(|c| c.to_string()).collect());
        for values in rows {
            let mut row = Row::new();
            for (col, value) in columns.iter().zip(values) {
                row.insert(col.to_string(), value);
            }
            ds.push_row(row);
        }
        ds
    }

    fn records(n: usize) -> Cell {
        Cell::Records(vec![SubRecord::new(); n])
    }

    fn count_rule(name: &str, base: &str) -> DeriveRule {
        DeriveRule::Count { name: name.into(), base_column: base.into(), overwrite: false }
    }

    fn bucket(label: &str, floor: Option<f64>, ceiling: Option<f64>, int_value: i64) -> MapBucket {
        MapBucket { label: label.into(), floor, ceiling, int_value }
    }

    #[test]
    fn test_count() {
        let ds = dataset(
            &["UR", "Gene"],
            vec![
                vec![Cell::Text("UR-1".into()), records(3)],
                vec![Cell::Text("UR-2".into()), records(0)],
                vec![Cell::Text("UR-3".into()), Cell::Missing],
            ],
        );
        let config = DerivationConfig { columns: vec![count_rule("Gene Count", "Gene")] };

        let (out, _) = derive(ds, &config).unwrap();
        assert_eq!(out.rows[0]["Gene Count"], Cell::Number(3.0));
        assert_eq!(out.rows[1]["Gene Count"], Cell::Number(0.0));
        assert_eq!(out.rows[2]["Gene Count"], Cell::Number(0.0));
    }

    #[test]
    fn test_mapping_boundaries() {
        let ds = dataset(
            &["UR", "Ferritin"],
            [50.0, 100.0, 150.0, 200.0, 250.0]
                .iter()
                .enumerate()
                .map(|(i, v)| vec![Cell::Text(format!("UR-{}", i)), Cell::Number(*v)])
                .collect(),
        );
        let config = DerivationConfig {
            columns: vec![DeriveRule::Mapping {
                name: "Class".into(),
                base_column: "Ferritin".into(),
                map: vec![
                    bucket("low", None, Some(100.0), 0),
                    bucket("mid", Some(100.0), Some(200.0), 1),
                    bucket("high", Some(200.0), None, 2),
                ],
                overwrite: false,
            }],
        };

        let (out, labels) = derive(ds, &config).unwrap();
        let classes: Vec<&Cell> = out.rows.iter().map(|r| &r["Class"]).collect();
        assert_eq!(
            classes,
            [
                &Cell::Number(0.0),
                &Cell::Number(1.0),
                &Cell::Number(1.0),
                &Cell::Number(2.0),
                &Cell::Number(2.0),
            ]
        );
        assert_eq!(labels["Class"]["0"], "low");
        assert_eq!(labels["Class"]["2"], "high");
    }

    #[test]
    fn test_mapping_no_match_is_missing() {
        let ds = dataset(
            &["UR", "Ferritin"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(999.0)],
                vec![Cell::Text("UR-2".into()), Cell::Missing],
            ],
        );
        let config = DerivationConfig {
            columns: vec![DeriveRule::Mapping {
                name: "Class".into(),
                base_column: "Ferritin".into(),
                map: vec![bucket("low", None, Some(100.0), 0)],
                overwrite: false,
            }],
        };

        let (out, _) = derive(ds, &config).unwrap();
        assert!(out.rows[0]["Class"].is_missing());
        assert!(out.rows[1]["Class"].is_missing());
    }

    #[test]
    fn test_mapping_overlap_first_match_wins() {
        let ds = dataset(
            &["UR", "V"],
            vec![vec![Cell::Text("UR-1".into()), Cell::Number(150.0)]],
        );
        let config = DerivationConfig {
            columns: vec![DeriveRule::Mapping {
                name: "Class".into(),
                base_column: "V".into(),
                map: vec![
                    bucket("wide", Some(0.0), Some(1000.0), 7),
                    bucket("narrow", Some(100.0), Some(200.0), 1),
                ],
                overwrite: false,
            }],
        };

        let (out, _) = derive(ds, &config).unwrap();
        // Declared order, not specificity, decides.
        assert_eq!(out.rows[0]["Class"], Cell::Number(7.0));
    }

    fn iron_rule() -> DeriveRule {
        let mut high = IndexMap::new();
        high.insert("TF Sats".to_string(), Predicate { greater_than: Some(45.0), less_than: None });
        high.insert("Ferritin".to_string(), Predicate { greater_than: Some(200.0), less_than: None });

        let mut low = IndexMap::new();
        low.insert("TF Sats".to_string(), Predicate { greater_than: None, less_than: Some(20.0) });
        low.insert("Ferritin".to_string(), Predicate { greater_than: Some(100.0), less_than: None });

        DeriveRule::Conditional {
            name: "Serum Iron Class".into(),
            rules: vec![
                Clause { conditions: high, then: Outcome { value: 2.0, label: "overload".into() } },
                Clause { conditions: low, then: Outcome { value: 1.0, label: "deficiency".into() } },
            ],
            default: Outcome { value: 0.0, label: "normal".into() },
            overwrite: false,
        }
    }

    #[test]
    fn test_conditional_first_match_and_default() {
        let ds = dataset(
            &["UR", "TF Sats", "Ferritin"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(50.0), Cell::Number(250.0)],
                vec![Cell::Text("UR-2".into()), Cell::Number(10.0), Cell::Number(50.0)],
            ],
        );
        let config = DerivationConfig { columns: vec![iron_rule()] };

        let (out, labels) = derive(ds, &config).unwrap();
        // (50, 250) matches the first clause.
        assert_eq!(out.rows[0]["Serum Iron Class"], Cell::Number(2.0));
        // (10, 50) passes TF Sats<20 but fails Ferritin>100 → default.
        assert_eq!(out.rows[1]["Serum Iron Class"], Cell::Number(0.0));
        assert_eq!(labels["Serum Iron Class"]["0"], "normal");
        assert_eq!(labels["Serum Iron Class"]["2"], "overload");
    }

    #[test]
    fn test_conditional_missing_operand_fails_predicate() {
        let ds = dataset(
            &["UR", "TF Sats", "Ferritin"],
            vec![vec![Cell::Text("UR-1".into()), Cell::Missing, Cell::Number(250.0)]],
        );
        let config = DerivationConfig { columns: vec![iron_rule()] };

        let (out, _) = derive(ds, &config).unwrap();
        assert_eq!(out.rows[0]["Serum Iron Class"], Cell::Number(0.0));
    }

    #[test]
    fn test_later_rule_reads_earlier_derived_column() {
        let ds = dataset(
            &["UR", "Gene"],
            vec![
                vec![Cell::Text("UR-1".into()), records(3)],
                vec![Cell::Text("UR-2".into()), records(0)],
            ],
        );

        let mut many = IndexMap::new();
        many.insert("Gene Count".to_string(), Predicate { greater_than: Some(2.0), less_than: None });
        let config = DerivationConfig {
            columns: vec![
                count_rule("Gene Count", "Gene"),
                DeriveRule::Conditional {
                    name: "Mutation Load".into(),
                    rules: vec![Clause {
                        conditions: many,
                        then: Outcome { value: 1.0, label: "high".into() },
                    }],
                    default: Outcome { value: 0.0, label: "low".into() },
                    overwrite: false,
                },
            ],
        };

        let (out, _) = derive(ds, &config).unwrap();
        assert_eq!(out.rows[0]["Mutation Load"], Cell::Number(1.0));
        assert_eq!(out.rows[1]["Mutation Load"], Cell::Number(0.0));
    }

    #[test]
    fn test_collision_without_overwrite_fails() {
        let ds = dataset(
            &["UR", "Gene", "Gene Count"],
            vec![vec![Cell::Text("UR-1".into()), records(1), Cell::Number(9.0)]],
        );
        let config = DerivationConfig { columns: vec![count_rule("Gene Count", "Gene")] };
        assert!(derive(ds, &config).is_err());
    }

    #[test]
    fn test_collision_with_overwrite_replaces() {
        let ds = dataset(
            &["UR", "Gene", "Gene Count"],
            vec![vec![Cell::Text("UR-1".into()), records(1), Cell::Number(9.0)]],
        );
        let config = DerivationConfig {
            columns: vec![DeriveRule::Count {
                name: "Gene Count".into(),
                base_column: "Gene".into(),
                overwrite: true,
            }],
        };

        let (out, _) = derive(ds, &config).unwrap();
        assert_eq!(out.rows[0]["Gene Count"], Cell::Number(1.0));
        // Position unchanged: still the third column.
        assert_eq!(out.columns, ["UR", "Gene", "Gene Count"]);
    }

    #[test]
    fn test_unknown_base_column_fails() {
        let ds = dataset(&["UR"], vec![vec![Cell::Text("UR-1".into())]]);
        let config = DerivationConfig { columns: vec![count_rule("Gene Count", "Gene")] };
        assert!(derive(ds, &config).is_err());
    }
}
