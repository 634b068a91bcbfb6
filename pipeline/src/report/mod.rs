//! Output-collaborator seam.
//!
//! The statistics and report layers consume the final dataset through
//! [`ReportSink`]; the pipeline itself never renders anything. What it
//! does provide is [`MetadataLookup`]: coded values resolved to labels,
//! merged from two sources:
//!
//! - derivation rules (bucket/clause labels recorded during the run)
//! - header descriptions that embed a code map, e.g.
//!   `Gender #1=Male 2=Female`
//!
//! [`JsonExport`] is the built-in sink: it writes the transformed rows
//! as pretty JSON, which is also what the CLI's `--output` produces.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{Cell, Dataset};
use crate::transform::deriver::{DerivedLabels, LabelMap};

// =============================================================================
// Errors
// =============================================================================

/// Errors from report sinks.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Report JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Metadata lookup
// =============================================================================

/// Matches `<code> =` / `<code>:` / `<code> -` openings of a code map
/// entry inside a header description.
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*[=:\-]").expect("valid regex"));

/// Column → coded-value → human label.
#[derive(Debug, Clone, Default)]
pub struct MetadataLookup {
    lookup: IndexMap<String, LabelMap>,
}

impl MetadataLookup {
    /// Build the lookup for a run.
    ///
    /// Labels recorded by derivation rules win over code maps parsed
    /// from header descriptions of the same column.
    pub fn from_run(descriptions: &IndexMap<String, String>, derived: &DerivedLabels) -> Self {
        let mut lookup = IndexMap::new();

        for (column, description) in descriptions {
            let map = parse_code_map(description);
            if !map.is_empty() {
                lookup.insert(column.clone(), map);
            }
        }
        for (column, map) in derived {
            lookup.insert(column.clone(), map.clone());
        }

        Self { lookup }
    }

    /// The label for a cell value of a column, when one is known.
    pub fn label_for(&self, column: &str, value: &Cell) -> Option<&str> {
        self.lookup
            .get(column)
            .and_then(|map| map.get(&value.display()))
            .map(String::as_str)
    }

    /// The full code map of a column.
    pub fn column(&self, column: &str) -> Option<&LabelMap> {
        self.lookup.get(column)
    }

    /// Columns with a known code map.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.lookup.keys()
    }
}

/// Extract a code map from a header description.
///
/// `1=Male 2=Female`, `1: path, 2: VUS` and `0 - absent; 1 - present`
/// all parse; a plain-text description yields an empty map.
fn parse_code_map(description: &str) -> LabelMap {
    let mut map = LabelMap::new();

    let entries: Vec<(String, usize, usize)> = CODE_RE
        .captures_iter(description)
        .map(|cap| {
            let whole = cap.get(0).expect("match exists");
            (cap[1].to_string(), whole.start(), whole.end())
        })
        .collect();

    for (idx, (code, _, label_start)) in entries.iter().enumerate() {
        let label_end = entries
            .get(idx + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(description.len());
        let label = description[*label_start..label_end]
            .trim()
            .trim_end_matches([',', ';'])
            .trim();
        if !label.is_empty() {
            map.insert(code.clone(), label.to_string());
        }
    }

    map
}

// =============================================================================
// Sinks
// =============================================================================

/// A consumer of the final dataset. Implementations must tolerate
/// numeric, string and missing cell values in any column.
pub trait ReportSink {
    fn consume(&mut self, dataset: &Dataset, metadata: &MetadataLookup) -> Result<(), ReportError>;
}

/// Writes the transformed rows as pretty JSON.
pub struct JsonExport {
    path: PathBuf,
}

impl JsonExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonExport {
    fn consume(&mut self, dataset: &Dataset, _metadata: &MetadataLookup) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(&dataset.rows)?;
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
