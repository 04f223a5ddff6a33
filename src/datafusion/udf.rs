//! Scalar functions exposing the classifier and timing extractor to SQL.

use crate::capture::QueryId;
use crate::classify::Classifier;
use crate::timing::TimingExtractor;
use datafusion::arrow::array::{Array, AsArray, Float64Array, StringArray};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::DataType;
use datafusion::error::Result;
use datafusion::logical_expr::{create_udf, ColumnarValue, ScalarUDF, Volatility};
use std::sync::Arc;

pub const QTYPE_UDF: &str = "qtype";
pub const MAT_TIME_UDF: &str = "mat_time";
pub const PLAN_RUNTIME_UDF: &str = "plan_runtime";

/// `qtype(query VARCHAR) -> VARCHAR`: category label of a query id.
pub fn qtype_udf(classifier: Classifier) -> ScalarUDF {
    create_udf(
        QTYPE_UDF,
        vec![DataType::Utf8],
        DataType::Utf8,
        Volatility::Immutable,
        Arc::new(move |args: &[ColumnarValue]| -> Result<ColumnarValue> {
            let arrays = ColumnarValue::values_to_arrays(args)?;
            let ids = cast(&arrays[0], &DataType::Utf8)?;
            let ids = ids.as_string::<i32>();
            let labels: StringArray = ids
                .iter()
                .map(|id| id.map(|id| classifier.classify(&QueryId::new(id)).as_str()))
                .collect();
            Ok(ColumnarValue::Array(Arc::new(labels)))
        }),
    )
}

/// `mat_time(plan_timings VARCHAR) -> DOUBLE`
pub fn mat_time_udf(extractor: Arc<dyn TimingExtractor>) -> ScalarUDF {
    timing_udf(MAT_TIME_UDF, extractor, |ex, blob| {
        ex.extract_materialize_time(blob)
    })
}

/// `plan_runtime(plan_timings VARCHAR) -> DOUBLE`
pub fn plan_runtime_udf(extractor: Arc<dyn TimingExtractor>) -> ScalarUDF {
    timing_udf(PLAN_RUNTIME_UDF, extractor, |ex, blob| {
        ex.extract_total_exec_time(blob)
    })
}

fn timing_udf(
    name: &str,
    extractor: Arc<dyn TimingExtractor>,
    extract: fn(&dyn TimingExtractor, &str) -> f64,
) -> ScalarUDF {
    create_udf(
        name,
        vec![DataType::Utf8],
        DataType::Float64,
        Volatility::Immutable,
        Arc::new(move |args: &[ColumnarValue]| -> Result<ColumnarValue> {
            let arrays = ColumnarValue::values_to_arrays(args)?;
            let blobs = cast(&arrays[0], &DataType::Utf8)?;
            let blobs = blobs.as_string::<i32>();
            let values: Float64Array = (0..blobs.len())
                .map(|i| {
                    let blob = if blobs.is_null(i) { "" } else { blobs.value(i) };
                    Some(extract(extractor.as_ref(), blob))
                })
                .collect();
            Ok(ColumnarValue::Array(Arc::new(values)))
        }),
    )
}

/// All pipeline UDFs.
pub fn pipeline_udfs(
    classifier: &Classifier,
    extractor: &Arc<dyn TimingExtractor>,
) -> Vec<ScalarUDF> {
    vec![
        qtype_udf(classifier.clone()),
        mat_time_udf(extractor.clone()),
        plan_runtime_udf(extractor.clone()),
    ]
}
