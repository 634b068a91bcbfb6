//! High-level pipeline API.
//!
//! Runs the fixed stage sequence — aggregate → standardize → impute →
//! derive — exactly once per invocation, failing fast on any stage's
//! fatal error. The transformed dataset and the derived-label metadata
//! are handed to the statistics/report collaborators; no stage re-reads
//! a later stage's output.
//!
//! # Example
//!
//! ```rust,ignore
//! use cohortprep::{transform_file, PipelineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_file("config.json")?;
//!     let outcome = transform_file("data/cohort.csv", &config)?;
//!     println!("Transformed {} subjects", outcome.dataset.len());
//!     Ok(())
//! }
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::{log_info, log_success};
use crate::models::Dataset;
use crate::parser::parse_file_auto;
use crate::transform::aggregator::aggregate;
use crate::transform::deriver::{derive, DerivedLabels};
use crate::transform::fitter::fit;
use crate::transform::standardizer::standardize;

/// Source file information, for run reports.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// The fully transformed dataset.
    pub dataset: Dataset,

    /// Header descriptions from `name #description` annotations.
    pub descriptions: IndexMap<String, String>,

    /// Coded-value → label lookups recorded by derivation rules.
    pub labels: DerivedLabels,

    /// Input file metadata.
    pub source: SourceInfo,
}

/// Run the transformation stages over an in-memory dataset.
///
/// This is the core entry point: the dataset is threaded by value
/// through the four stages and returned with the derived-label
/// metadata.
pub fn run(dataset: Dataset, config: &PipelineConfig) -> PipelineResult<(Dataset, DerivedLabels)> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    log_info("Aggregating rows by identifier...");
    let dataset = aggregate(dataset, &config.data.data_cleansing)?;

    log_info("Standardizing numeric columns...");
    let dataset = standardize(dataset);

    log_info("Fitting missing data...");
    let dataset = fit(dataset, &config.data.data_fitting, &config.data.data_cleansing.id_column)?;

    log_info("Deriving columns...");
    let (dataset, labels) = derive(dataset, &config.data.data_derivation)?;

    log_success(format!(
        "Pipeline complete: {} rows, {} columns",
        dataset.len(),
        dataset.columns.len()
    ));
    Ok((dataset, labels))
}

/// Load a CSV file and run the full pipeline on it.
pub fn transform_file(path: impl AsRef<Path>, config: &PipelineConfig) -> PipelineResult<RunOutcome> {
    let path = path.as_ref();
    log_info(format!("Reading {}...", path.display()));

    let parsed = parse_file_auto(path)?;
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected delimiter: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.dataset.len()));

    let source = SourceInfo {
        encoding: parsed.encoding.clone(),
        delimiter: parsed.delimiter,
        headers: parsed.dataset.columns.clone(),
        row_count: parsed.dataset.len(),
    };

    let (dataset, labels) = run(parsed.dataset, config)?;

    Ok(RunOutcome {
        dataset,
        descriptions: parsed.descriptions,
        labels,
        source,
    })
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}
