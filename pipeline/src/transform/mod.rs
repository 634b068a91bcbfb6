//! Transformation stages.
//!
//! The pipeline's fixed order is aggregate → standardize → impute →
//! derive; [`pipeline`] wires the stages together:
//!
//! - [`headers`]: raw header normalization (`name #description`)
//! - [`aggregator`]: collapse rows sharing an identifier
//! - [`standardizer`]: reconcile mixed percent/plain numeric columns
//! - [`fitter`]: per-column missing-data policies
//! - [`deriver`]: count, bucket-mapping and conditional derivations
//! - [`pipeline`]: orchestration and file-level entry points

pub mod aggregator;
pub mod deriver;
pub mod fitter;
pub mod headers;
pub mod pipeline;
pub mod standardizer;

pub use aggregator::aggregate;
pub use deriver::{derive, DerivedLabels, LabelMap};
pub use fitter::fit;
pub use headers::{normalize_headers, split_header};
pub use pipeline::{run, transform_file, RunOutcome, SourceInfo};
pub use standardizer::standardize;
