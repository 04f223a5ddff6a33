//! End-to-end tests: captures on disk through the engine to metrics, charts
//! and the summary report.

use datafusion::arrow::array::{Array, AsArray};
use datafusion::arrow::datatypes::Float64Type;
use lineagebench::analysis::TidyFilter;
use lineagebench::{AnalysisEngine, CaptureSource, PipelineError, QueryResponse};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "query,sf,n_threads,lineage_type,plan_timings,runtime,output,lineage_size,lineage_count,nchunks,postprocess_time";

/// Query 1 has all three modes, 11 and 2 lack Logical-OPT, query 2 has two
/// Baseline runs (plan runtime 3.0 and 5.0).
const CAPTURES: &[&str] = &[
    "1,1,1,Baseline,\"{'SEQ_SCAN': 2.0}\",2.0,100,,,,",
    "1,1,1,Logical-RID,\"{'CREATE_TABLE_AS': 0.5, 'SEQ_SCAN': 2.5}\",3.0,100,4096,100,2,0.01",
    "1,1,1,Logical-OPT,\"{'CREATE_TABLE_AS': 0.25, 'SEQ_SCAN': 2.25}\",2.5,100,2048,100,1,0.01",
    "11,1,1,Baseline,\"{'SEQ_SCAN': 1.0}\",1.0,0,,,,",
    "11,1,1,Logical-RID,\"{'CREATE_TABLE_AS': 1.0, 'SEQ_SCAN': 1.0}\",2.0,0,512,10,1,0.02",
    "2,1,1,Baseline,\"{'SEQ_SCAN': 3.0}\",3.0,50,,,,",
    "2,1,1,Baseline,\"{'SEQ_SCAN': 5.0}\",5.0,50,,,,",
    "2,1,1,Logical-RID,\"{'SEQ_SCAN': 5.0}\",5.0,75,256,50,1,0.0",
];

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_csv(&self, name: &str, rows: &[&str]) -> PathBuf {
        let path = self.path(name);
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.push('\n');
        std::fs::write(&path, body).unwrap();
        path
    }

    fn engine(&self, source: &Path) -> AnalysisEngine {
        AnalysisEngine::builder()
            .source(CaptureSource::from_path(source).unwrap())
            .figures_dir(self.path("figures"))
            .metrics_dump(self.path("out/metrics.csv"))
            .build()
            .unwrap()
    }
}

fn f64_column(response: &QueryResponse, column: usize) -> Vec<f64> {
    response
        .results
        .iter()
        .flat_map(|b| {
            let array = b.column(column).as_primitive::<Float64Type>();
            (0..array.len()).map(|i| array.value(i)).collect::<Vec<_>>()
        })
        .collect()
}

fn string_column(response: &QueryResponse, column: usize) -> Vec<String> {
    response
        .results
        .iter()
        .flat_map(|b| {
            let column = datafusion::arrow::compute::cast(
                b.column(column),
                &datafusion::arrow::datatypes::DataType::Utf8,
            )
            .unwrap();
            let array = column.as_string::<i32>();
            (0..array.len())
                .map(|i| array.value(i).to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[tokio::test]
async fn test_csv_pipeline_counts() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let engine = fx.engine(&csv);

    let report = engine.run().await.unwrap();

    assert_eq!(report.diagnostics.substituted, 2);
    assert_eq!(report.diagnostics.captures, 10);
    assert_eq!(report.aggregated.len(), 9);
    assert_eq!(report.metrics.len(), 9);
    assert_eq!(report.tidy.len(), 27);
    assert_eq!(report.charted(&TidyFilter::default()).len(), 18);
    assert_eq!(report.diagnostics.dropped_without_baseline, 0);
    assert!(report.diagnostics.unknown_queries.is_empty());
}

#[tokio::test]
async fn test_csv_pipeline_overheads_via_sql() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let engine = fx.engine(&csv);
    engine.run().await.unwrap();

    let response = engine
        .sql(
            "SELECT exec_overhead, exec_roverhead, overhead, roverhead \
             FROM metrics WHERE query = '1' AND lineage_type = 'Logical-RID'",
        )
        .await
        .unwrap();
    assert_eq!(response.row_count(), 1);
    assert_eq!(f64_column(&response, 0), vec![500.0]);
    assert_eq!(f64_column(&response, 1), vec![25.0]);
    assert_eq!(f64_column(&response, 2), vec![1000.0]);
    assert_eq!(f64_column(&response, 3), vec![50.0]);

    // Baseline runs of query 2 average to 4.0; the RID run takes 5.0
    let response = engine
        .sql("SELECT overhead FROM metrics WHERE query = '2' AND lineage_type = 'Logical-OPT'")
        .await
        .unwrap();
    assert_eq!(f64_column(&response, 0), vec![1000.0]);

    let response = engine
        .sql("SELECT DISTINCT qtype FROM metrics WHERE query = '11'")
        .await
        .unwrap();
    assert_eq!(string_column(&response, 0), vec!["2. Uncorrelated subQs"]);
}

#[tokio::test]
async fn test_zero_base_output_has_no_fanout() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let report = fx.engine(&csv).run().await.unwrap();

    let q11 = report
        .metrics
        .iter()
        .find(|m| m.query.as_str() == "11" && m.lineage_type == "Logical-RID")
        .unwrap();
    assert_eq!(q11.fanout, None);

    let q2 = report
        .metrics
        .iter()
        .find(|m| m.query.as_str() == "2" && m.lineage_type == "Logical-RID")
        .unwrap();
    assert_eq!(q2.fanout, Some(1.5));
}

#[tokio::test]
async fn test_summary_ordered_by_query_number() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let engine = fx.engine(&csv);
    engine.run().await.unwrap();

    let summary = engine.summary("Baseline", 1.0).await.unwrap();
    assert_eq!(string_column(&summary, 2), vec!["1", "2", "11"]);
    // Baseline joined with itself
    assert_eq!(f64_column(&summary, 3), vec![0.0, 0.0, 0.0]);

    let empty = engine.summary("Baseline", 10.0).await.unwrap();
    assert_eq!(empty.row_count(), 0);
}

#[tokio::test]
async fn test_charts_and_dump_written() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let engine = fx.engine(&csv);
    let report = engine.run().await.unwrap();

    let charts = engine.render_charts(&report).unwrap();
    assert_eq!(
        charts,
        vec![
            fx.path("figures").join("tpch_roverhead.vl.json"),
            fx.path("figures").join("tpch_overhead.vl.json"),
        ]
    );
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&charts[0]).unwrap()).unwrap();
    assert_eq!(doc["data"]["values"].as_array().unwrap().len(), 18);

    let dump = engine.write_metrics_dump(&report).unwrap().unwrap();
    let text = std::fs::read_to_string(dump).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("qtype,query,sf"));
    assert_eq!(lines.count(), 9);
}

#[tokio::test]
async fn test_missing_baseline_fails() {
    let fx = Fixture::new();
    let csv = fx.write_csv(
        "captures.csv",
        &["1,1,1,Logical-RID,\"{'SEQ_SCAN': 2.0}\",2.0,100,,,,"],
    );
    let err = fx.engine(&csv).run().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingBaseline(_))
    ));
}

#[tokio::test]
async fn test_missing_source_fails() {
    let fx = Fixture::new();
    let err = fx
        .engine(&fx.path("absent.csv"))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::SourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_raw_captures_queryable() {
    let fx = Fixture::new();
    let csv = fx.write_csv("captures.csv", CAPTURES);
    let engine = fx.engine(&csv);
    engine.run().await.unwrap();

    let raw = engine
        .sql("SELECT count(*) FROM tpch_capture")
        .await
        .unwrap();
    let count = raw.results[0].column(0).as_primitive::<datafusion::arrow::datatypes::Int64Type>();
    assert_eq!(count.value(0), 8);

    let udf = engine
        .sql("SELECT plan_runtime(plan_timings) FROM tpch_capture WHERE query = 1 AND lineage_type = 'Logical-RID'")
        .await
        .unwrap();
    assert_eq!(f64_column(&udf, 0), vec![3.0]);
}

#[tokio::test]
async fn test_duckdb_source() {
    let fx = Fixture::new();
    let db_path = fx.path("bench.duckdb");
    {
        let conn = duckdb::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tpch_capture (
                query INTEGER, sf DOUBLE, n_threads INTEGER, lineage_type VARCHAR,
                plan_timings VARCHAR, output INTEGER
            );
            INSERT INTO tpch_capture VALUES
                (4, 1.0, 1, 'Baseline', '{\"SEQ_SCAN\": 2.0}', 10),
                (4, 1.0, 1, 'Logical-RID', '{\"CREATE_TABLE_AS\": 1.0, \"SEQ_SCAN\": 3.0}', 20);",
        )
        .unwrap();
    }

    let engine = fx.engine(&db_path);
    let report = engine.run().await.unwrap();

    assert_eq!(report.diagnostics.substituted, 1);
    let rid = report
        .metrics
        .iter()
        .find(|m| m.lineage_type == "Logical-RID")
        .unwrap();
    assert_eq!(rid.exec_overhead, 1000.0);
    assert_eq!(rid.exec_roverhead, 50.0);
    assert_eq!(rid.fanout, Some(2.0));
    // absent optional columns read as NULL
    assert_eq!(rid.nchunks, None);
    assert_eq!(rid.postprocess_time, None);
}

fn count(response: &QueryResponse) -> i64 {
    response.results[0]
        .column(0)
        .as_primitive::<datafusion::arrow::datatypes::Int64Type>()
        .value(0)
}

#[tokio::test]
async fn test_duckdb_raw_captures_queryable() {
    let fx = Fixture::new();
    let db_path = fx.path("bench.duckdb");
    {
        let conn = duckdb::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tpch_capture (
                query INTEGER, sf DOUBLE, n_threads INTEGER, lineage_type VARCHAR,
                plan_timings VARCHAR, output INTEGER
            );
            INSERT INTO tpch_capture VALUES
                (4, 1.0, 1, 'Baseline', '{\"SEQ_SCAN\": 2.0}', 10),
                (4, 1.0, 1, 'Logical-RID', '{\"SEQ_SCAN\": 3.0}', 20);",
        )
        .unwrap();
    }

    let engine = fx.engine(&db_path);
    let report = engine.run().await.unwrap();
    assert_eq!(report.diagnostics.substituted, 1);
    assert_eq!(engine.capture_table(), "tpch_capture");

    // the substituted Logical-OPT copy only shows up in the enriched table
    let raw = engine.sql("SELECT count(*) FROM tpch_capture").await.unwrap();
    assert_eq!(count(&raw), 2);
    let enriched = engine.sql("SELECT count(*) FROM captures").await.unwrap();
    assert_eq!(count(&enriched), 3);

    let modes = engine
        .sql("SELECT lineage_type FROM tpch_capture ORDER BY lineage_type")
        .await
        .unwrap();
    assert_eq!(string_column(&modes, 0), vec!["Baseline", "Logical-RID"]);
}

#[tokio::test]
async fn test_duckdb_missing_required_column() {
    let fx = Fixture::new();
    let db_path = fx.path("bench.duckdb");
    {
        let conn = duckdb::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tpch_capture (query INTEGER, sf DOUBLE, lineage_type VARCHAR, plan_timings VARCHAR);",
        )
        .unwrap();
    }

    let err = fx.engine(&db_path).run().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingColumn(c)) if c == "n_threads"
    ));
}
