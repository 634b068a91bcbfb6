//! Error types for the cohortprep transformation pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - dataset loading errors
//! - [`ConfigError`] - malformed or incomplete configuration
//! - [`FormatError`] - unparseable headers or values, with row/column context
//! - [`FitError`] - imputation errors (the missing-operand case is non-fatal)
//! - [`DeriveError`] - derivation errors
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Dataset Loading Errors
// =============================================================================

/// Errors while loading the source dataset.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV structure.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("Input file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No header row found in input")]
    NoHeaders,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in the configuration document. All fatal, raised before any
/// transform runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The document is not valid JSON.
    #[error("Configuration is not valid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The document violates the embedded schema.
    #[error("Configuration schema violation: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// A rule is missing a required key or carries an unusable value.
    #[error("Invalid rule for '{name}': {message}")]
    InvalidRule { name: String, message: String },

    /// A derivation rule reads a derived column declared after it.
    #[error("Derivation '{rule}' reads '{reference}', which is derived later in the list")]
    ForwardReference { rule: String, reference: String },

    /// A rule names a column the dataset does not have. Column existence
    /// is not pre-checked, so this surfaces at transform time.
    #[error("{stage}: column '{column}' does not exist in the dataset")]
    UnknownColumn { stage: String, column: String },
}

// =============================================================================
// Format Errors
// =============================================================================

/// A value or header that could not be parsed where a strict parse is
/// required. Carries enough context to locate the offending cell.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Header with an empty column name.
    #[error("Header '{0}' has an empty column name")]
    EmptyHeaderName(String),

    /// A cell value failed a strictly-required parse.
    #[error("Column '{column}', row '{row_id}': cannot parse '{value}'")]
    BadValue {
        column: String,
        row_id: String,
        value: String,
    },
}

// =============================================================================
// Imputation Errors
// =============================================================================

/// Errors raised by the imputation ("fitting") stage.
#[derive(Debug, Error)]
pub enum FitError {
    /// A calc-rule operand is missing on a row. Non-fatal: the caller
    /// logs it and leaves the cell missing.
    #[error("Calc for '{column}' on row '{row_id}': operand '{operand}' is missing")]
    MissingOperand {
        column: String,
        row_id: String,
        operand: String,
    },

    /// Value format problem while imputing.
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl FitError {
    /// Whether this error aborts the run. Only the missing-operand case
    /// is recoverable (the cell stays missing).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FitError::MissingOperand { .. })
    }
}

// =============================================================================
// Derivation Errors
// =============================================================================

/// Errors raised by the derivation stage.
#[derive(Debug, Error)]
pub enum DeriveError {
    /// A conditional rule matched nothing and carried no default.
    /// The config layer rejects such rules, so reaching this means the
    /// rule bypassed validation, not that the data is bad.
    #[error("Rule '{rule}' matched nothing for row '{row_id}' and has no default")]
    UnmatchedRule { rule: String, row_id: String },

    /// The derived column name collides with an existing column.
    #[error("Derived column '{0}' already exists (set overwrite to allow)")]
    ColumnCollision(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::run`].
/// It wraps all lower-level errors and adds pipeline-specific variants.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset loading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Format error.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Imputation error.
    #[error("Fitting error: {0}")]
    Fit(#[from] FitError),

    /// Derivation error.
    #[error("Derivation error: {0}")]
    Derive(#[from] DeriveError),

    /// No rows to transform.
    #[error("No rows to transform")]
    EmptyInput,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dataset loading.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
