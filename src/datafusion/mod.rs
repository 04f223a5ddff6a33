mod tables;
mod udf;

use crate::analysis::AnalysisReport;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::error::Result;
use datafusion::prelude::SessionContext;
use std::sync::Arc;

pub use tables::{
    aggregated_batch, aggregated_schema, captures_batch, captures_schema, metrics_batch,
    metrics_schema, raw_captures_batch, raw_captures_schema, tidy_batch, tidy_schema,
    AGGREGATED_TABLE, CAPTURES_TABLE, METRICS_TABLE, TIDY_TABLE,
};
pub use udf::{
    mat_time_udf, pipeline_udfs, plan_runtime_udf, qtype_udf, MAT_TIME_UDF, PLAN_RUNTIME_UDF,
    QTYPE_UDF,
};

/// Register `batch` as an in-memory table, replacing any table of that name.
pub fn register_batch(ctx: &SessionContext, name: &str, batch: RecordBatch) -> Result<()> {
    let table = MemTable::try_new(batch.schema(), vec![vec![batch]])?;
    ctx.deregister_table(name)?;
    ctx.register_table(name, Arc::new(table))?;
    Ok(())
}

/// Register every intermediate table of a report.
pub fn register_report(ctx: &SessionContext, report: &AnalysisReport) -> Result<()> {
    register_batch(ctx, CAPTURES_TABLE, captures_batch(&report.captures)?)?;
    register_batch(ctx, AGGREGATED_TABLE, aggregated_batch(&report.aggregated)?)?;
    register_batch(ctx, METRICS_TABLE, metrics_batch(&report.metrics)?)?;
    register_batch(ctx, TIDY_TABLE, tidy_batch(&report.tidy)?)?;
    Ok(())
}
