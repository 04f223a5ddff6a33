use lineagebench::analysis::{NonFinitePolicy, OverheadFamily};
use lineagebench::classify::QueryCategory;
use lineagebench::config::AppConfig;
use lineagebench::CaptureSource;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("lineagebench.toml");
    std::fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[input]
type = "duckdb"
path = "captures.db"
table = "runs"

[classifier]
joins_aggregations = [1, 3]
uncorrelated_subqueries = ["11"]
correlated_subqueries = [2]

[modes]
baseline = "Baseline"
substitutions = [{ from = "Logical-RID", to = "Logical-OPT" }, { from = "Perm", to = "Smoke" }]

[analysis]
non_finite = "reject"
include_baseline_row = false

[presentation]
families = ["Materialize"]
"#,
    );

    let config = AppConfig::load(Some(&path)).unwrap();
    config.validate().unwrap();

    assert_eq!(
        config.input.source().unwrap(),
        CaptureSource::Duckdb {
            path: "captures.db".into(),
            table: "runs".to_string()
        }
    );
    assert_eq!(config.analysis.non_finite, NonFinitePolicy::Reject);
    assert!(!config.analysis.include_baseline_row);
    assert_eq!(config.modes.substitutions.len(), 2);

    let table = config.classifier.category_table().unwrap();
    let ids: Vec<&str> = table
        .members(QueryCategory::JoinsAggregations)
        .iter()
        .map(|q| q.as_str())
        .collect();
    assert_eq!(ids, vec!["1", "3"]);

    let filter = config.presentation.tidy_filter().unwrap();
    assert_eq!(filter.families, vec![OverheadFamily::Materialize]);
    assert_eq!(filter.n_threads, Some(1));
}

#[test]
fn test_overlap_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[classifier]
joins_aggregations = [1, 2]
uncorrelated_subqueries = [11]
correlated_subqueries = [2]
"#,
    );
    let config = AppConfig::load(Some(&path)).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_env_override() {
    std::env::set_var("LINEAGEBENCH_ANALYSIS__SUMMARY_SF", "100");
    let config = AppConfig::load(None).unwrap();
    std::env::remove_var("LINEAGEBENCH_ANALYSIS__SUMMARY_SF");

    assert_eq!(config.analysis.summary_sf, 100.0);
    assert_eq!(config.analysis.summary_lineage_type, "Baseline");
}

#[test]
fn test_thread_filter_all() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[presentation]
families = ["Total"]
n_threads = "all"
"#,
    );
    let config = AppConfig::load(Some(&path)).unwrap();
    config.validate().unwrap();
    assert_eq!(config.presentation.n_threads, None);
    assert_eq!(config.presentation.tidy_filter().unwrap().n_threads, None);
}

#[test]
fn test_thread_filter_count_and_default() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[presentation]\nn_threads = 4\n");
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.presentation.n_threads, Some(4));

    let path = write_config(&dir, "[presentation]\nfamilies = [\"Total\"]\n");
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.presentation.n_threads, Some(1));

    let path = write_config(&dir, "[presentation]\nn_threads = \"lots\"\n");
    assert!(AppConfig::load(Some(&path)).is_err());
}
