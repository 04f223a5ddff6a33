//! Error types for the overhead analysis pipeline

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

/// Errors that can occur while loading captures or computing overheads
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The capture source does not exist
    #[error("capture source not found: {0}")]
    SourceNotFound(String),

    /// The capture source format could not be determined or is not supported
    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    /// A column the pipeline cannot work without is absent
    #[error("required column '{0}' is missing from the capture table")]
    MissingColumn(String),

    /// A required column holds NULL
    #[error("column '{column}' is NULL in row {row}")]
    NullValue { column: String, row: usize },

    /// The capture table has no rows
    #[error("capture table is empty")]
    EmptyCaptures,

    /// No aggregated group carries the baseline lineage type
    #[error("no '{0}' captures found, overheads cannot be computed")]
    MissingBaseline(String),

    /// Query engine failure
    #[error("query failed: {0}")]
    DataFusion(#[from] DataFusionError),

    /// Arrow conversion failure
    #[error("arrow conversion failed: {0}")]
    Arrow(#[from] ArrowError),

    /// DuckDB capture database failure
    #[error("duckdb read failed: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Chart or dump output failure
    #[error("output failed: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Output(e.to_string())
    }
}
