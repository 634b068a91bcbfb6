//! Missing-data imputation ("fitting").
//!
//! Each configured column carries a policy: drop the row, fill with a
//! column statistic or zero, or compute the value from two other columns
//! (date subtraction scaled to a time unit). Policies run in document
//! order, and a `drop` shrinks the row universe seen by every later
//! policy — that ordering is a contract, not an accident.

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::config::{CalcSpec, FitPolicy, FitRule};
use crate::error::{ConfigError, FitError, PipelineResult};
use crate::logging::{log_info, log_success, log_warning};
use crate::models::{Cell, Dataset};

/// Apply every configured fitting rule, in document order.
pub fn fit(
    mut dataset: Dataset,
    fitting: &IndexMap<String, FitRule>,
    id_column: &str,
) -> PipelineResult<Dataset> {
    for (column, rule) in fitting {
        if !dataset.has_column(column) {
            return Err(ConfigError::UnknownColumn {
                stage: "fitting".into(),
                column: column.clone(),
            }
            .into());
        }

        let missing_ids: Vec<String> = dataset
            .rows
            .iter()
            .filter(|row| row.get(column.as_str()).map(Cell::is_missing).unwrap_or(true))
            .map(|row| dataset.row_id(row, id_column))
            .collect();

        if missing_ids.is_empty() {
            log_info(format!("No missing data detected in '{}'", column));
            continue;
        }
        log_warning(format!("Missing values found in '{}': {:?}", column, missing_ids));

        match rule {
            FitRule::Policy(FitPolicy::Drop) => {
                dataset.retain_rows(|row| {
                    row.get(column.as_str()).map(|c| !c.is_missing()).unwrap_or(false)
                });
                log_success(format!("Rows with missing '{}' have been dropped", column));
            }

            FitRule::Policy(FitPolicy::Mean) => {
                match mean(&dataset, column) {
                    Some(value) => {
                        fill_missing(&mut dataset, column, Cell::Number(value));
                        log_success(format!("Missing '{}' values filled with mean", column));
                    }
                    None => log_warning(format!("'{}' has no numeric values; skipping mean", column)),
                }
            }

            FitRule::Policy(FitPolicy::Median) => {
                match median(&dataset, column) {
                    Some(value) => {
                        fill_missing(&mut dataset, column, Cell::Number(value));
                        log_success(format!("Missing '{}' values filled with median", column));
                    }
                    None => {
                        log_warning(format!("'{}' has no numeric values; skipping median", column))
                    }
                }
            }

            FitRule::Policy(FitPolicy::Mode) => {
                match mode(&dataset, column) {
                    Some(value) => {
                        fill_missing(&mut dataset, column, value);
                        log_success(format!("Missing '{}' values filled with mode", column));
                    }
                    None => log_warning(format!("'{}' has no mode; skipping", column)),
                }
            }

            FitRule::Policy(FitPolicy::Zero) => {
                fill_missing(&mut dataset, column, Cell::Number(0.0));
                log_success(format!("Missing '{}' values filled with zero", column));
            }

            // Rejected by config validation; reaching it means the rule
            // bypassed `PipelineConfig::validate`.
            FitRule::Policy(FitPolicy::Calc) => {
                return Err(ConfigError::InvalidRule {
                    name: column.clone(),
                    message: "'calc' requires a spec object".into(),
                }
                .into());
            }

            FitRule::Calc(spec) => {
                apply_calc(&mut dataset, column, spec, id_column);
                log_success(format!(
                    "'{}' values calculated using: {} {} {} in {}s",
                    column, spec.first_input, spec.operator, spec.second_input, spec.unit
                ));
            }
        }
    }

    Ok(dataset)
}

/// Fill every missing cell of the column with the given value.
fn fill_missing(dataset: &mut Dataset, column: &str, value: Cell) {
    for row in &mut dataset.rows {
        let is_missing = row.get(column).map(Cell::is_missing).unwrap_or(true);
        if is_missing {
            row.insert(column.to_string(), value.clone());
        }
    }
}

/// Non-missing numeric values of a column, in row order.
fn numeric_values(dataset: &Dataset, column: &str) -> Vec<f64> {
    dataset.column_cells(column).filter_map(Cell::as_number).collect()
}

fn mean(dataset: &Dataset, column: &str) -> Option<f64> {
    let values = numeric_values(dataset, column);
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(dataset: &Dataset, column: &str) -> Option<f64> {
    let mut values = numeric_values(dataset, column);
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).expect("no NaN in parsed numerics"));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Most frequent non-missing value; ties break to the value seen first
/// in row order.
fn mode(dataset: &Dataset, column: &str) -> Option<Cell> {
    let mut counts: Vec<(Cell, usize)> = Vec::new();
    for cell in dataset.column_cells(column) {
        if cell.is_missing() {
            continue;
        }
        match counts.iter_mut().find(|(value, _)| value == cell) {
            Some((_, count)) => *count += 1,
            None => counts.push((cell.clone(), 1)),
        }
    }
    let mut best: Option<(Cell, usize)> = None;
    for (value, count) in counts {
        // Strictly greater: counts are in first-encounter order, so ties
        // keep the earlier value.
        if best.as_ref().map(|(_, c)| count > *c).unwrap_or(true) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Compute `first_input - second_input` as dates for every row missing
/// the column. A missing or unparseable operand is logged and leaves the
/// cell missing; the run continues.
fn apply_calc(dataset: &mut Dataset, column: &str, spec: &CalcSpec, id_column: &str) {
    let mut failures: Vec<FitError> = Vec::new();

    for idx in 0..dataset.rows.len() {
        let is_missing = dataset.rows[idx]
            .get(column)
            .map(Cell::is_missing)
            .unwrap_or(true);
        if !is_missing {
            continue;
        }

        let row_id = dataset.row_id(&dataset.rows[idx], id_column);

        let first = dataset.rows[idx].get(&spec.first_input).and_then(parse_date);
        let second = dataset.rows[idx].get(&spec.second_input).and_then(parse_date);

        match (first, second) {
            (Some(a), Some(b)) => {
                let months = (a - b).num_days() as f64 / 30.0;
                dataset.rows[idx].insert(column.to_string(), Cell::Number(months));
            }
            (None, _) => failures.push(FitError::MissingOperand {
                column: column.to_string(),
                row_id,
                operand: spec.first_input.clone(),
            }),
            (_, None) => failures.push(FitError::MissingOperand {
                column: column.to_string(),
                row_id,
                operand: spec.second_input.clone(),
            }),
        }
    }

    for failure in failures {
        log_warning(failure.to_string());
    }
}

/// Date formats accepted for calc operands, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d.%m.%Y",
];

fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    let text = cell.as_text()?;
    let trimmed = text.trim();

    // Datetime strings: keep the date part.
    let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);
    let date_part = date_part.split('T').next().unwrap_or(date_part);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;

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

    fn policy(p: FitPolicy) -> FitRule {
        FitRule::Policy(p)
    }

    #[test]
    fn test_mean_fills_all_missing() {
        let ds = dataset(
            &["UR", "Ferritin"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(100.0)],
                vec![Cell::Text("UR-2".into()), Cell::Missing],
                vec![Cell::Text("UR-3".into()), Cell::Number(300.0)],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Ferritin".to_string(), policy(FitPolicy::Mean));

        let out = fit(ds, &fitting, "UR").unwrap();
        assert_eq!(out.rows[1]["Ferritin"], Cell::Number(200.0));
        assert!(out.column_cells("Ferritin").all(|c| !c.is_missing()));
    }

    #[test]
    fn test_median_even_count() {
        let ds = dataset(
            &["UR", "TF Sats"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(10.0)],
                vec![Cell::Text("UR-2".into()), Cell::Number(20.0)],
                vec![Cell::Text("UR-3".into()), Cell::Number(40.0)],
                vec![Cell::Text("UR-4".into()), Cell::Number(50.0)],
                vec![Cell::Text("UR-5".into()), Cell::Missing],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("TF Sats".to_string(), policy(FitPolicy::Median));

        let out = fit(ds, &fitting, "UR").unwrap();
        assert_eq!(out.rows[4]["TF Sats"], Cell::Number(30.0));
    }

    #[test]
    fn test_mode_tie_breaks_to_first_seen() {
        let ds = dataset(
            &["UR", "Tier"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Text("B".into())],
                vec![Cell::Text("UR-2".into()), Cell::Text("A".into())],
                vec![Cell::Text("UR-3".into()), Cell::Text("A".into())],
                vec![Cell::Text("UR-4".into()), Cell::Text("B".into())],
                vec![Cell::Text("UR-5".into()), Cell::Missing],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Tier".to_string(), policy(FitPolicy::Mode));

        let out = fit(ds, &fitting, "UR").unwrap();
        // B and A both occur twice; B was seen first.
        assert_eq!(out.rows[4]["Tier"], Cell::Text("B".into()));
    }

    #[test]
    fn test_zero_fills() {
        let ds = dataset(
            &["UR", "Blasts"],
            vec![vec![Cell::Text("UR-1".into()), Cell::Missing]],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Blasts".to_string(), policy(FitPolicy::Zero));

        let out = fit(ds, &fitting, "UR").unwrap();
        assert_eq!(out.rows[0]["Blasts"], Cell::Number(0.0));
    }

    #[test]
    fn test_drop_shrinks_universe_for_later_policies() {
        // UR-3 has missing Ferritin and an outlier TF Sats; dropping it
        // first changes the mean the later rule computes.
        let ds = dataset(
            &["UR", "Ferritin", "TF Sats"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(100.0), Cell::Number(10.0)],
                vec![Cell::Text("UR-2".into()), Cell::Number(200.0), Cell::Missing],
                vec![Cell::Text("UR-3".into()), Cell::Missing, Cell::Number(1000.0)],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Ferritin".to_string(), policy(FitPolicy::Drop));
        fitting.insert("TF Sats".to_string(), policy(FitPolicy::Mean));

        let out = fit(ds, &fitting, "UR").unwrap();
        assert_eq!(out.len(), 2);
        // Mean over the surviving rows only: just 10.0.
        assert_eq!(out.rows[1]["TF Sats"], Cell::Number(10.0));
    }

    #[test]
    fn test_calc_six_months() {
        let ds = dataset(
            &["UR", "Dx OS", "Date last FollowUp (or death)", "Date AML dx"],
            vec![vec![
                Cell::Text("UR-1".into()),
                Cell::Missing,
                Cell::Text("2020-06-29".into()),
                Cell::Text("2020-01-01".into()),
            ]],
        );
        let mut fitting = IndexMap::new();
        fitting.insert(
            "Dx OS".to_string(),
            FitRule::Calc(CalcSpec {
                first_input: "Date last FollowUp (or death)".into(),
                operator: "-".into(),
                second_input: "Date AML dx".into(),
                unit: "month".into(),
            }),
        );

        let out = fit(ds, &fitting, "UR").unwrap();
        // 180 days apart → exactly 6 months at 30 days/month.
        assert_eq!(out.rows[0]["Dx OS"], Cell::Number(6.0));
    }

    #[test]
    fn test_calc_missing_operand_is_non_fatal() {
        let ds = dataset(
            &["UR", "Dx OS", "End", "Start"],
            vec![
                vec![
                    Cell::Text("UR-1".into()),
                    Cell::Missing,
                    Cell::Text("2020-06-29".into()),
                    Cell::Missing,
                ],
                vec![
                    Cell::Text("UR-2".into()),
                    Cell::Missing,
                    Cell::Text("2020-03-01".into()),
                    Cell::Text("2020-01-01".into()),
                ],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert(
            "Dx OS".to_string(),
            FitRule::Calc(CalcSpec {
                first_input: "End".into(),
                operator: "-".into(),
                second_input: "Start".into(),
                unit: "month".into(),
            }),
        );

        let out = fit(ds, &fitting, "UR").unwrap();
        // UR-1 keeps its missing cell; UR-2 is computed.
        assert!(out.rows[0]["Dx OS"].is_missing());
        assert_eq!(out.rows[1]["Dx OS"], Cell::Number(2.0));
    }

    #[test]
    fn test_calc_does_not_touch_present_values() {
        let ds = dataset(
            &["UR", "Dx OS", "End", "Start"],
            vec![vec![
                Cell::Text("UR-1".into()),
                Cell::Number(42.0),
                Cell::Text("2020-06-29".into()),
                Cell::Text("2020-01-01".into()),
            ]],
        );
        let mut fitting = IndexMap::new();
        fitting.insert(
            "Dx OS".to_string(),
            FitRule::Calc(CalcSpec {
                first_input: "End".into(),
                operator: "-".into(),
                second_input: "Start".into(),
                unit: "month".into(),
            }),
        );

        let out = fit(ds, &fitting, "UR").unwrap();
        assert_eq!(out.rows[0]["Dx OS"], Cell::Number(42.0));
    }

    #[test]
    fn test_idempotent_on_fitted_column() {
        let ds = dataset(
            &["UR", "Ferritin"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Number(100.0)],
                vec![Cell::Text("UR-2".into()), Cell::Missing],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Ferritin".to_string(), policy(FitPolicy::Mean));

        let once = fit(ds, &fitting, "UR").unwrap();
        let twice = fit(once.clone(), &fitting, "UR").unwrap();
        assert_eq!(once.rows, twice.rows);
    }

    #[test]
    fn test_non_numeric_column_mean_skipped() {
        let ds = dataset(
            &["UR", "Karyotype"],
            vec![
                vec![Cell::Text("UR-1".into()), Cell::Text("complex".into())],
                vec![Cell::Text("UR-2".into()), Cell::Missing],
            ],
        );
        let mut fitting = IndexMap::new();
        fitting.insert("Karyotype".to_string(), policy(FitPolicy::Mean));

        let out = fit(ds, &fitting, "UR").unwrap();
        assert!(out.rows[1]["Karyotype"].is_missing());
    }

    #[test]
    fn test_unknown_column_fails() {
        let ds = dataset(&["UR"], vec![vec![Cell::Text("UR-1".into())]]);
        let mut fitting = IndexMap::new();
        fitting.insert("Ferritin".to_string(), policy(FitPolicy::Zero));
        assert!(fit(ds, &fitting, "UR").is_err());
    }

    #[test]
    fn test_date_formats() {
        assert!(parse_date(&Cell::Text("2020-01-31".into())).is_some());
        assert!(parse_date(&Cell::Text("31/01/2020".into())).is_some());
        assert!(parse_date(&Cell::Text("2020-01-31 00:00:00".into())).is_some());
        assert!(parse_date(&Cell::Text("not a date".into())).is_none());
        assert!(parse_date(&Cell::Missing).is_none());
    }
}
