//! Lineage-capture overhead analysis for TPC-H benchmark runs.
//!
//! Captures are loaded from a DuckDB, CSV, Parquet or NDJSON source, enriched
//! with query categories and operator timings, aggregated per configuration
//! and compared against the Baseline run. The resulting tables are hosted in a
//! DataFusion session for ad-hoc SQL and rendered as Vega-Lite charts.

pub mod analysis;
pub mod capture;
pub mod classify;
pub mod config;
pub mod datafusion;
mod engine;
pub mod error;
pub mod render;
pub mod source;
pub mod telemetry;
pub mod timing;

pub use engine::{AnalysisEngine, AnalysisEngineBuilder, QueryResponse};
pub use error::PipelineError;
pub use source::CaptureSource;
