//! Benchmark capture records and their decoding from Arrow batches.

use crate::error::PipelineError;
use datafusion::arrow::array::{Array, ArrayRef, AsArray};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Float64Type, Int64Type};
use datafusion::arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Lineage type of the reference execution mode.
pub const BASELINE: &str = "Baseline";

/// Identifier of a TPC-H query.
///
/// Captures store the id as an integer or a string; both normalize to the
/// trimmed decimal text. Numeric ids order numerically (`2 < 10`), any
/// non-numeric ids sort after them lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is one.
    pub fn number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for QueryId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for QueryId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<i64> for QueryId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// TPC-H scale factor, usable as a grouping key.
///
/// Equality and ordering follow `f64::total_cmp`; `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            Self(0.0)
        } else {
            Self(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for ScaleFactor {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for ScaleFactor {}

impl Ord for ScaleFactor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for ScaleFactor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for ScaleFactor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl std::fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for ScaleFactor {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// One benchmark execution as captured by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub query: QueryId,
    pub sf: ScaleFactor,
    pub n_threads: i64,
    pub lineage_type: String,
    /// Serialized operator timing breakdown.
    pub plan_timings: Option<String>,
    pub runtime: Option<f64>,
    pub output: Option<f64>,
    pub lineage_size: Option<i64>,
    pub lineage_count: Option<i64>,
    pub nchunks: Option<i64>,
    pub postprocess_time: Option<f64>,
}

impl CaptureRecord {
    /// Record with only the key columns and timing blob set.
    pub fn new(
        query: impl Into<QueryId>,
        sf: f64,
        n_threads: i64,
        lineage_type: impl Into<String>,
        plan_timings: Option<String>,
    ) -> Self {
        Self {
            query: query.into(),
            sf: ScaleFactor::new(sf),
            n_threads,
            lineage_type: lineage_type.into(),
            plan_timings,
            runtime: None,
            output: None,
            lineage_size: None,
            lineage_count: None,
            nchunks: None,
            postprocess_time: None,
        }
    }
}

/// Column names of the capture table.
pub mod columns {
    pub const QUERY: &str = "query";
    pub const SF: &str = "sf";
    pub const N_THREADS: &str = "n_threads";
    pub const LINEAGE_TYPE: &str = "lineage_type";
    pub const PLAN_TIMINGS: &str = "plan_timings";
    pub const RUNTIME: &str = "runtime";
    pub const OUTPUT: &str = "output";
    pub const LINEAGE_SIZE: &str = "lineage_size";
    pub const LINEAGE_COUNT: &str = "lineage_count";
    pub const NCHUNKS: &str = "nchunks";
    pub const POSTPROCESS_TIME: &str = "postprocess_time";

    /// Columns without which a capture row is meaningless.
    pub const REQUIRED: &[&str] = &[QUERY, SF, N_THREADS, LINEAGE_TYPE, PLAN_TIMINGS];
}

/// Decode capture rows from Arrow batches.
///
/// Column lookup is case-insensitive and values are cast to the expected
/// types, so integer query ids or integer scale factors are accepted.
/// Optional metric columns may be absent entirely.
pub fn records_from_batches(batches: &[RecordBatch]) -> Result<Vec<CaptureRecord>, PipelineError> {
    let mut records = Vec::new();
    let mut row_offset = 0usize;

    for batch in batches {
        let query = required(batch, columns::QUERY, &DataType::Utf8)?;
        let sf = required(batch, columns::SF, &DataType::Float64)?;
        let n_threads = required(batch, columns::N_THREADS, &DataType::Int64)?;
        let lineage_type = required(batch, columns::LINEAGE_TYPE, &DataType::Utf8)?;
        let plan_timings = required(batch, columns::PLAN_TIMINGS, &DataType::Utf8)?;
        let runtime = optional(batch, columns::RUNTIME, &DataType::Float64)?;
        let output = optional(batch, columns::OUTPUT, &DataType::Float64)?;
        let lineage_size = optional(batch, columns::LINEAGE_SIZE, &DataType::Int64)?;
        let lineage_count = optional(batch, columns::LINEAGE_COUNT, &DataType::Int64)?;
        let nchunks = optional(batch, columns::NCHUNKS, &DataType::Int64)?;
        let postprocess_time = optional(batch, columns::POSTPROCESS_TIME, &DataType::Float64)?;

        let query = query.as_string::<i32>();
        let sf = sf.as_primitive::<Float64Type>();
        let n_threads = n_threads.as_primitive::<Int64Type>();
        let lineage_type = lineage_type.as_string::<i32>();
        let plan_timings = plan_timings.as_string::<i32>();

        for i in 0..batch.num_rows() {
            let row = row_offset + i;
            let null = |column: &str| PipelineError::NullValue {
                column: column.to_string(),
                row,
            };
            if query.is_null(i) {
                return Err(null(columns::QUERY));
            }
            if sf.is_null(i) {
                return Err(null(columns::SF));
            }
            if n_threads.is_null(i) {
                return Err(null(columns::N_THREADS));
            }
            if lineage_type.is_null(i) {
                return Err(null(columns::LINEAGE_TYPE));
            }

            records.push(CaptureRecord {
                query: QueryId::new(query.value(i)),
                sf: ScaleFactor::new(sf.value(i)),
                n_threads: n_threads.value(i),
                lineage_type: lineage_type.value(i).to_string(),
                plan_timings: (!plan_timings.is_null(i))
                    .then(|| plan_timings.value(i).to_string()),
                runtime: f64_at(&runtime, i),
                output: f64_at(&output, i),
                lineage_size: i64_at(&lineage_size, i),
                lineage_count: i64_at(&lineage_count, i),
                nchunks: i64_at(&nchunks, i),
                postprocess_time: f64_at(&postprocess_time, i),
            });
        }
        row_offset += batch.num_rows();
    }

    Ok(records)
}

fn find_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ArrayRef> {
    let schema = batch.schema();
    let idx = schema
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case(name))?;
    Some(batch.column(idx))
}

fn required(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef, PipelineError> {
    let column =
        find_column(batch, name).ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?;
    Ok(cast(column, to)?)
}

fn optional(
    batch: &RecordBatch,
    name: &str,
    to: &DataType,
) -> Result<Option<ArrayRef>, PipelineError> {
    find_column(batch, name)
        .map(|column| cast(column, to))
        .transpose()
        .map_err(PipelineError::from)
}

fn f64_at(array: &Option<ArrayRef>, i: usize) -> Option<f64> {
    let array = array.as_ref()?.as_primitive::<Float64Type>();
    (!array.is_null(i)).then(|| array.value(i))
}

fn i64_at(array: &Option<ArrayRef>, i: usize) -> Option<i64> {
    let array = array.as_ref()?.as_primitive::<Int64Type>();
    (!array.is_null(i)).then(|| array.value(i))
}
