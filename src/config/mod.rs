use crate::analysis::{ModeSubstitution, NonFinitePolicy, OverheadFamily, TidyFilter};
use crate::capture::{QueryId, BASELINE};
use crate::classify::{CategoryTable, QueryCategory};
use crate::source::{CaptureSource, DEFAULT_CAPTURE_TABLE};
use crate::timing::DEFAULT_MATERIALIZE_MARKER;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variables with this prefix override file values,
/// e.g. `LINEAGEBENCH_INPUT__PATH=bench.duckdb`.
pub const ENV_PREFIX: &str = "LINEAGEBENCH";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub modes: ModesConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// `duckdb`, `csv`, `parquet` or `json`; inferred from the path when unset.
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    #[serde(default = "default_input_path")]
    pub path: String,
    /// Capture table inside a DuckDB file.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source_type: None,
            path: default_input_path(),
            table: default_table(),
        }
    }
}

/// The benchmark harness writes a DuckDB database under this name, so it is
/// read as DuckDB regardless of its extension.
pub const DEFAULT_INPUT_PATH: &str = "tpch_benchmark_capture_may27_e.csv";

fn default_input_path() -> String {
    DEFAULT_INPUT_PATH.to_string()
}

fn default_table() -> String {
    DEFAULT_CAPTURE_TABLE.to_string()
}

impl InputConfig {
    pub fn source(&self) -> Result<CaptureSource> {
        let source = match &self.source_type {
            Some(t) => CaptureSource::with_type(t, &self.path, Some(self.table.clone()))?,
            None if self.path == DEFAULT_INPUT_PATH => CaptureSource::Duckdb {
                path: self.path.clone().into(),
                table: self.table.clone(),
            },
            None => match CaptureSource::from_path(&self.path)? {
                CaptureSource::Duckdb { path, .. } => CaptureSource::Duckdb {
                    path,
                    table: self.table.clone(),
                },
                other => other,
            },
        };
        Ok(source)
    }
}

/// Category membership lists; ids may be written as numbers or strings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_joins_aggregations")]
    pub joins_aggregations: Vec<String>,
    #[serde(default = "default_uncorrelated_subqueries")]
    pub uncorrelated_subqueries: Vec<String>,
    #[serde(default = "default_correlated_subqueries")]
    pub correlated_subqueries: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            joins_aggregations: default_joins_aggregations(),
            uncorrelated_subqueries: default_uncorrelated_subqueries(),
            correlated_subqueries: default_correlated_subqueries(),
        }
    }
}

fn tpch_members(category: QueryCategory) -> Vec<String> {
    CategoryTable::tpch()
        .members(category)
        .iter()
        .map(|q| q.as_str().to_string())
        .collect()
}

fn default_joins_aggregations() -> Vec<String> {
    tpch_members(QueryCategory::JoinsAggregations)
}

fn default_uncorrelated_subqueries() -> Vec<String> {
    tpch_members(QueryCategory::UncorrelatedSubqueries)
}

fn default_correlated_subqueries() -> Vec<String> {
    tpch_members(QueryCategory::CorrelatedSubqueries)
}

impl ClassifierConfig {
    pub fn category_table(&self) -> Result<CategoryTable> {
        let ids = |list: &[String]| list.iter().map(QueryId::new).collect::<Vec<_>>();
        CategoryTable::new(
            ids(&self.joins_aggregations),
            ids(&self.uncorrelated_subqueries),
            ids(&self.correlated_subqueries),
        )
        .context("Invalid classifier lists")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Operator-name substrings that mark materialization operators.
    #[serde(default = "default_markers")]
    pub materialize_markers: Vec<String>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            materialize_markers: default_markers(),
        }
    }
}

fn default_markers() -> Vec<String> {
    vec![DEFAULT_MATERIALIZE_MARKER.to_string()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModesConfig {
    #[serde(default = "default_baseline")]
    pub baseline: String,
    #[serde(default = "default_substitutions")]
    pub substitutions: Vec<ModeSubstitution>,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            substitutions: default_substitutions(),
        }
    }
}

fn default_baseline() -> String {
    BASELINE.to_string()
}

fn default_substitutions() -> Vec<ModeSubstitution> {
    vec![ModeSubstitution::rid_for_opt()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub non_finite: NonFinitePolicy,
    #[serde(default = "default_true")]
    pub include_baseline_row: bool,
    /// Lineage type the summary report is restricted to.
    #[serde(default = "default_baseline")]
    pub summary_lineage_type: String,
    #[serde(default = "default_summary_sf")]
    pub summary_sf: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            non_finite: NonFinitePolicy::default(),
            include_baseline_row: true,
            summary_lineage_type: default_baseline(),
            summary_sf: default_summary_sf(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_summary_sf() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresentationConfig {
    /// Family names: `Total`, `Materialize`, `Execute`.
    #[serde(default = "default_families")]
    pub families: Vec<String>,
    /// Thread count to chart. `"all"` disables the thread filter.
    #[serde(default = "default_n_threads", with = "thread_filter")]
    pub n_threads: Option<i64>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            families: default_families(),
            n_threads: default_n_threads(),
        }
    }
}

fn default_families() -> Vec<String> {
    TidyFilter::default()
        .families
        .iter()
        .map(|f| f.as_str().to_string())
        .collect()
}

fn default_n_threads() -> Option<i64> {
    Some(1)
}

/// `n_threads` is either a count or the keyword `all`.
mod thread_filter {
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ALL: &str = "all";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(i64),
        Keyword(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_i64(*n),
            None => serializer.serialize_str(ALL),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Some(n)),
            Raw::Keyword(s) if s.trim().eq_ignore_ascii_case(ALL) => Ok(None),
            Raw::Keyword(s) => s.trim().parse().map(Some).map_err(|_| {
                serde::de::Error::custom(format!(
                    "n_threads must be a thread count or \"{ALL}\", got \"{s}\""
                ))
            }),
        }
    }
}

impl PresentationConfig {
    pub fn tidy_filter(&self) -> Result<TidyFilter> {
        let families = self
            .families
            .iter()
            .map(|f| {
                OverheadFamily::parse(f)
                    .ok_or_else(|| anyhow::anyhow!("Invalid overhead family: {}", f))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TidyFilter {
            families,
            n_threads: self.n_threads,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_figures_dir")]
    pub figures_dir: String,
    /// Write the ordered metrics table as CSV here.
    pub metrics_dump: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            figures_dir: default_figures_dir(),
            metrics_dump: None,
        }
    }
}

fn default_figures_dir() -> String {
    "figures".to_string()
}

impl AppConfig {
    /// Load configuration from an optional file and environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Nested keys use a double underscore: LINEAGEBENCH_OUTPUT__FIGURES_DIR
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input.path.trim().is_empty() {
            anyhow::bail!("Input requires 'path'");
        }
        self.input.source()?;

        if self.modes.baseline.trim().is_empty() {
            anyhow::bail!("Baseline lineage type must not be empty");
        }
        for sub in &self.modes.substitutions {
            if sub.from == sub.to {
                anyhow::bail!("Substitution maps '{}' onto itself", sub.from);
            }
        }

        self.classifier.category_table()?;
        self.presentation.tidy_filter()?;

        if let Some(n) = self.presentation.n_threads {
            if n < 1 {
                anyhow::bail!("presentation.n_threads must be at least 1 or \"all\", got {}", n);
            }
        }

        if !self.analysis.summary_sf.is_finite() {
            anyhow::bail!("summary_sf must be finite");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.input.path, "tpch_benchmark_capture_may27_e.csv");
        assert_eq!(config.input.source().unwrap().source_type(), "duckdb");
        assert_eq!(config.presentation.tidy_filter().unwrap(), TidyFilter::default());
        assert_eq!(config.classifier.category_table().unwrap(), CategoryTable::tpch());
    }

    #[test]
    fn test_overlapping_lists_rejected() {
        let mut config = AppConfig::default();
        config.classifier.correlated_subqueries.push("1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_family_rejected() {
        let mut config = AppConfig::default();
        config.presentation.families = vec!["Total".into(), "Planning".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Planning"));
    }

    #[test]
    fn test_default_path_is_duckdb() {
        let mut config = AppConfig::default();
        match config.input.source().unwrap() {
            CaptureSource::Duckdb { path, table } => {
                assert_eq!(path.to_str(), Some(DEFAULT_INPUT_PATH));
                assert_eq!(table, "tpch_capture");
            }
            other => panic!("unexpected source {:?}", other),
        }

        config.input.path = "exported.csv".to_string();
        assert_eq!(config.input.source().unwrap().source_type(), "csv");

        config.input.path = DEFAULT_INPUT_PATH.to_string();
        config.input.source_type = Some("csv".to_string());
        assert_eq!(config.input.source().unwrap().source_type(), "csv");
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut config = AppConfig::default();
        config.presentation.n_threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duckdb_table_from_config() {
        let mut config = AppConfig::default();
        config.input.path = "bench.duckdb".to_string();
        config.input.table = "runs".to_string();
        match config.input.source().unwrap() {
            CaptureSource::Duckdb { table, .. } => assert_eq!(table, "runs"),
            other => panic!("unexpected source {:?}", other),
        }
    }
}
