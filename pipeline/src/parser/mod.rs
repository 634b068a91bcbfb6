//! CSV loader with encoding and delimiter auto-detection.
//!
//! The loader is the pipeline's input collaborator: it turns a delimited
//! text file into a [`Dataset`] with normalized headers, NA tokens mapped
//! to the missing marker, and plain numeric strings coerced to numbers.
//! Percent-decorated values and dates stay textual; the standardizer and
//! the imputer give them meaning later.

use indexmap::IndexMap;
use std::path::Path;

use crate::error::{CsvError, PipelineError, PipelineResult};
use crate::models::{Cell, Dataset, Row};
use crate::transform::headers::normalize_headers;

/// Strings treated as the missing marker, matching the spreadsheets this
/// pipeline grew up with.
pub const NA_TOKENS: &[&str] = &["NA", "na", "N/A", "n/a", "N/a"];

/// Result of loading with detection metadata.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The loaded dataset, headers normalized.
    pub dataset: Dataset,
    /// Header descriptions (`name #description` annotations).
    pub descriptions: IndexMap<String, String>,
    /// Detected or used encoding.
    pub encoding: String,
    /// Detected or used delimiter.
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> Result<String, CsvError> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8_lossy(bytes).to_string()),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => Ok(String::from_utf8_lossy(bytes).to_string()),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Coerce one raw field into a cell value.
///
/// Empty fields and NA tokens become `Missing`; plain numeric strings
/// become numbers; everything else stays text.
fn coerce_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
        return Cell::Missing;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Cell::Number(n);
    }
    Cell::Text(trimmed.to_string())
}

/// Parse delimited text into a dataset.
pub fn parse_str(content: &str, delimiter: char) -> PipelineResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile.into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::ParseError { line: 1, message: e.to_string() })?
        .iter()
        .map(str::to_string)
        .collect();

    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CsvError::NoHeaders.into());
    }

    let (columns, descriptions) = normalize_headers(&raw_headers).map_err(PipelineError::Format)?;

    let mut dataset = Dataset::new(columns.clone());
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| CsvError::ParseError {
            // +2: one for the header line, one for 1-based numbering
            line: idx + 2,
            message: e.to_string(),
        })?;

        let mut row = Row::new();
        for (col, field) in columns.iter().zip(record.iter()) {
            row.insert(col.clone(), coerce_cell(field));
        }
        dataset.push_row(row);
    }

    Ok(ParseResult {
        dataset,
        descriptions,
        encoding: "utf-8".to_string(),
        delimiter,
    })
}

/// Parse raw bytes with encoding and delimiter auto-detection.
pub fn parse_bytes_auto(bytes: &[u8]) -> PipelineResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile.into());
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let mut result = parse_str(&content, delimiter)?;
    result.encoding = encoding;
    Ok(result)
}

/// Load a CSV file with auto-detection.
pub fn parse_file_auto(path: impl AsRef<Path>) -> PipelineResult<ParseResult> {
    let bytes = std::fs::read(path).map_err(CsvError::IoError)?;
    parse_bytes_auto(&bytes)
}
