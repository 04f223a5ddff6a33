//! Arrow encodings of the pipeline's intermediate tables.

use crate::analysis::{AggregatedGroup, EnrichedCapture, OverheadMetrics, TidyRow};
use crate::capture::CaptureRecord;
use datafusion::arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::RecordBatch;
use std::sync::Arc;

pub const CAPTURES_TABLE: &str = "captures";
pub const AGGREGATED_TABLE: &str = "aggregated";
pub const METRICS_TABLE: &str = "metrics";
pub const TIDY_TABLE: &str = "tidy";

fn utf8(name: &str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

fn f64_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Float64, nullable)
}

fn i64_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Int64, nullable)
}

fn raw_capture_fields() -> Vec<Field> {
    vec![
        utf8("query"),
        f64_field("sf", false),
        i64_field("n_threads", false),
        utf8("lineage_type"),
        Field::new("plan_timings", DataType::Utf8, true),
        f64_field("runtime", true),
        f64_field("output", true),
        i64_field("lineage_size", true),
        i64_field("lineage_count", true),
        i64_field("nchunks", true),
        f64_field("postprocess_time", true),
    ]
}

/// Capture rows exactly as read from the source.
pub fn raw_captures_schema() -> SchemaRef {
    Arc::new(Schema::new(raw_capture_fields()))
}

/// Raw capture columns plus the derived `qtype`, `mat_time`, `plan_runtime`.
pub fn captures_schema() -> SchemaRef {
    let mut fields = raw_capture_fields();
    fields.push(utf8("qtype"));
    fields.push(f64_field("mat_time", false));
    fields.push(f64_field("plan_runtime", false));
    Arc::new(Schema::new(fields))
}

fn raw_capture_columns<'a>(rows: impl Iterator<Item = &'a CaptureRecord>) -> Vec<ArrayRef> {
    let mut query = StringBuilder::new();
    let mut sf = Float64Builder::new();
    let mut n_threads = Int64Builder::new();
    let mut lineage_type = StringBuilder::new();
    let mut plan_timings = StringBuilder::new();
    let mut runtime = Float64Builder::new();
    let mut output = Float64Builder::new();
    let mut lineage_size = Int64Builder::new();
    let mut lineage_count = Int64Builder::new();
    let mut nchunks = Int64Builder::new();
    let mut postprocess_time = Float64Builder::new();

    for r in rows {
        query.append_value(r.query.as_str());
        sf.append_value(r.sf.value());
        n_threads.append_value(r.n_threads);
        lineage_type.append_value(&r.lineage_type);
        plan_timings.append_option(r.plan_timings.as_deref());
        runtime.append_option(r.runtime);
        output.append_option(r.output);
        lineage_size.append_option(r.lineage_size);
        lineage_count.append_option(r.lineage_count);
        nchunks.append_option(r.nchunks);
        postprocess_time.append_option(r.postprocess_time);
    }

    vec![
        Arc::new(query.finish()),
        Arc::new(sf.finish()),
        Arc::new(n_threads.finish()),
        Arc::new(lineage_type.finish()),
        Arc::new(plan_timings.finish()),
        Arc::new(runtime.finish()),
        Arc::new(output.finish()),
        Arc::new(lineage_size.finish()),
        Arc::new(lineage_count.finish()),
        Arc::new(nchunks.finish()),
        Arc::new(postprocess_time.finish()),
    ]
}

pub fn raw_captures_batch(rows: &[CaptureRecord]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(raw_captures_schema(), raw_capture_columns(rows.iter()))
}

pub fn captures_batch(rows: &[EnrichedCapture]) -> Result<RecordBatch, ArrowError> {
    let mut columns = raw_capture_columns(rows.iter().map(|c| &c.record));

    let mut qtype = StringBuilder::new();
    let mut mat_time = Float64Builder::new();
    let mut plan_runtime = Float64Builder::new();
    for c in rows {
        qtype.append_value(c.category.as_str());
        mat_time.append_value(c.mat_time);
        plan_runtime.append_value(c.plan_runtime);
    }
    columns.push(Arc::new(qtype.finish()));
    columns.push(Arc::new(mat_time.finish()));
    columns.push(Arc::new(plan_runtime.finish()));

    RecordBatch::try_new(captures_schema(), columns)
}

pub fn aggregated_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8("query"),
        f64_field("sf", false),
        utf8("qtype"),
        utf8("lineage_type"),
        i64_field("n_threads", false),
        i64_field("nchunks", true),
        i64_field("lineage_size", true),
        i64_field("lineage_count", true),
        f64_field("postprocess_time", true),
        f64_field("plan_runtime", false),
        f64_field("runtime", true),
        f64_field("output", true),
        f64_field("mat_time", false),
        i64_field("runs", false),
    ]))
}

pub fn aggregated_batch(rows: &[AggregatedGroup]) -> Result<RecordBatch, ArrowError> {
    let mut query = StringBuilder::new();
    let mut sf = Float64Builder::new();
    let mut qtype = StringBuilder::new();
    let mut lineage_type = StringBuilder::new();
    let mut n_threads = Int64Builder::new();
    let mut nchunks = Int64Builder::new();
    let mut lineage_size = Int64Builder::new();
    let mut lineage_count = Int64Builder::new();
    let mut postprocess_time = Float64Builder::new();
    let mut plan_runtime = Float64Builder::new();
    let mut runtime = Float64Builder::new();
    let mut output = Float64Builder::new();
    let mut mat_time = Float64Builder::new();
    let mut runs = Int64Builder::new();

    for g in rows {
        query.append_value(g.query.as_str());
        sf.append_value(g.sf.value());
        qtype.append_value(g.category.as_str());
        lineage_type.append_value(&g.lineage_type);
        n_threads.append_value(g.n_threads);
        nchunks.append_option(g.nchunks);
        lineage_size.append_option(g.lineage_size);
        lineage_count.append_option(g.lineage_count);
        postprocess_time.append_option(g.postprocess_time);
        plan_runtime.append_value(g.plan_runtime);
        runtime.append_option(g.runtime);
        output.append_option(g.output);
        mat_time.append_value(g.mat_time);
        runs.append_value(g.runs as i64);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(query.finish()),
        Arc::new(sf.finish()),
        Arc::new(qtype.finish()),
        Arc::new(lineage_type.finish()),
        Arc::new(n_threads.finish()),
        Arc::new(nchunks.finish()),
        Arc::new(lineage_size.finish()),
        Arc::new(lineage_count.finish()),
        Arc::new(postprocess_time.finish()),
        Arc::new(plan_runtime.finish()),
        Arc::new(runtime.finish()),
        Arc::new(output.finish()),
        Arc::new(mat_time.finish()),
        Arc::new(runs.finish()),
    ];
    RecordBatch::try_new(aggregated_schema(), columns)
}

pub fn metrics_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8("qtype"),
        utf8("query"),
        f64_field("sf", false),
        utf8("lineage_type"),
        i64_field("n_threads", false),
        f64_field("fanout", true),
        f64_field("output", true),
        i64_field("nchunks", true),
        i64_field("lineage_size", true),
        i64_field("lineage_count", true),
        f64_field("postprocess_time", true),
        f64_field("exec_overhead", false),
        f64_field("exec_roverhead", false),
        f64_field("mat_overhead", false),
        f64_field("mat_roverhead", false),
        f64_field("overhead", false),
        f64_field("roverhead", false),
    ]))
}

pub fn metrics_batch(rows: &[OverheadMetrics]) -> Result<RecordBatch, ArrowError> {
    let mut qtype = StringBuilder::new();
    let mut query = StringBuilder::new();
    let mut sf = Float64Builder::new();
    let mut lineage_type = StringBuilder::new();
    let mut n_threads = Int64Builder::new();
    let mut fanout = Float64Builder::new();
    let mut output = Float64Builder::new();
    let mut nchunks = Int64Builder::new();
    let mut lineage_size = Int64Builder::new();
    let mut lineage_count = Int64Builder::new();
    let mut postprocess_time = Float64Builder::new();
    let mut exec_overhead = Float64Builder::new();
    let mut exec_roverhead = Float64Builder::new();
    let mut mat_overhead = Float64Builder::new();
    let mut mat_roverhead = Float64Builder::new();
    let mut overhead = Float64Builder::new();
    let mut roverhead = Float64Builder::new();

    for m in rows {
        qtype.append_value(m.category.as_str());
        query.append_value(m.query.as_str());
        sf.append_value(m.sf.value());
        lineage_type.append_value(&m.lineage_type);
        n_threads.append_value(m.n_threads);
        fanout.append_option(m.fanout);
        output.append_option(m.output);
        nchunks.append_option(m.nchunks);
        lineage_size.append_option(m.lineage_size);
        lineage_count.append_option(m.lineage_count);
        postprocess_time.append_option(m.postprocess_time);
        exec_overhead.append_value(m.exec_overhead);
        exec_roverhead.append_value(m.exec_roverhead);
        mat_overhead.append_value(m.mat_overhead);
        mat_roverhead.append_value(m.mat_roverhead);
        overhead.append_value(m.overhead);
        roverhead.append_value(m.roverhead);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(qtype.finish()),
        Arc::new(query.finish()),
        Arc::new(sf.finish()),
        Arc::new(lineage_type.finish()),
        Arc::new(n_threads.finish()),
        Arc::new(fanout.finish()),
        Arc::new(output.finish()),
        Arc::new(nchunks.finish()),
        Arc::new(lineage_size.finish()),
        Arc::new(lineage_count.finish()),
        Arc::new(postprocess_time.finish()),
        Arc::new(exec_overhead.finish()),
        Arc::new(exec_roverhead.finish()),
        Arc::new(mat_overhead.finish()),
        Arc::new(mat_roverhead.finish()),
        Arc::new(overhead.finish()),
        Arc::new(roverhead.finish()),
    ];
    RecordBatch::try_new(metrics_schema(), columns)
}

pub fn tidy_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8("overhead_type"),
        utf8("qtype"),
        utf8("qid"),
        f64_field("sf", false),
        i64_field("n_threads", false),
        f64_field("output", true),
        i64_field("nchunks", true),
        i64_field("lineage_size", true),
        i64_field("lineage_count", true),
        f64_field("postprocess_time", true),
        utf8("system"),
        f64_field("overhead", false),
        f64_field("roverhead", false),
    ]))
}

pub fn tidy_batch(rows: &[TidyRow]) -> Result<RecordBatch, ArrowError> {
    let mut overhead_type = StringBuilder::new();
    let mut qtype = StringBuilder::new();
    let mut qid = StringBuilder::new();
    let mut sf = Float64Builder::new();
    let mut n_threads = Int64Builder::new();
    let mut output = Float64Builder::new();
    let mut nchunks = Int64Builder::new();
    let mut lineage_size = Int64Builder::new();
    let mut lineage_count = Int64Builder::new();
    let mut postprocess_time = Float64Builder::new();
    let mut system = StringBuilder::new();
    let mut overhead = Float64Builder::new();
    let mut roverhead = Float64Builder::new();

    for r in rows {
        overhead_type.append_value(r.overhead_type.as_str());
        qtype.append_value(r.qtype.as_str());
        qid.append_value(r.qid.as_str());
        sf.append_value(r.sf.value());
        n_threads.append_value(r.n_threads);
        output.append_option(r.output);
        nchunks.append_option(r.nchunks);
        lineage_size.append_option(r.lineage_size);
        lineage_count.append_option(r.lineage_count);
        postprocess_time.append_option(r.postprocess_time);
        system.append_value(&r.system);
        overhead.append_value(r.overhead);
        roverhead.append_value(r.roverhead);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(overhead_type.finish()),
        Arc::new(qtype.finish()),
        Arc::new(qid.finish()),
        Arc::new(sf.finish()),
        Arc::new(n_threads.finish()),
        Arc::new(output.finish()),
        Arc::new(nchunks.finish()),
        Arc::new(lineage_size.finish()),
        Arc::new(lineage_count.finish()),
        Arc::new(postprocess_time.finish()),
        Arc::new(system.finish()),
        Arc::new(overhead.finish()),
        Arc::new(roverhead.finish()),
    ];
    RecordBatch::try_new(tidy_schema(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;

    #[test]
    fn test_batches_match_schemas() {
        let blob = Some(r#"{"SEQ_SCAN": 1.0, "CREATE_TABLE_AS": 0.5}"#.to_string());
        let records = vec![
            CaptureRecord::new("1", 1.0, 1, "Baseline", blob.clone()),
            CaptureRecord::new("1", 1.0, 1, "Logical-RID", blob),
        ];
        let report = Analyzer::default().run(records.clone()).unwrap();

        let captures = captures_batch(&report.captures).unwrap();
        assert_eq!(captures.num_rows(), 3);
        assert_eq!(captures.schema(), captures_schema());

        let raw = raw_captures_batch(&records).unwrap();
        assert_eq!(raw.num_rows(), 2);
        assert_eq!(raw.schema(), raw_captures_schema());
        assert_eq!(raw.num_columns() + 3, captures.num_columns());

        let aggregated = aggregated_batch(&report.aggregated).unwrap();
        assert_eq!(aggregated.num_rows(), 3);

        let metrics = metrics_batch(&report.metrics).unwrap();
        assert_eq!(metrics.num_rows(), 3);
        assert_eq!(metrics.num_columns(), metrics_schema().fields().len());

        let tidy = tidy_batch(&report.tidy).unwrap();
        assert_eq!(tidy.num_rows(), 9);
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(metrics_batch(&[]).unwrap().num_rows(), 0);
        assert_eq!(tidy_batch(&[]).unwrap().num_rows(), 0);
    }
}
