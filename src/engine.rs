use crate::analysis::{AnalysisOptions, AnalysisReport, Analyzer, TidyFilter};
use crate::capture::CaptureRecord;
use crate::classify::{CategoryTable, Classifier};
use crate::config::AppConfig;
use crate::datafusion::{
    metrics_batch, pipeline_udfs, raw_captures_batch, register_batch, register_report,
    METRICS_TABLE,
};
use crate::render::{ChartRenderer, ChartSpec, VegaLiteRenderer};
use crate::source::{CaptureSource, DEFAULT_CAPTURE_TABLE};
use crate::timing::{ProfilerTimingExtractor, TimingExtractor};
use anyhow::{Context, Result};
use datafusion::arrow::csv::WriterBuilder;
use datafusion::arrow::datatypes::Schema;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, Instrument};

/// Result of a query execution.
pub struct QueryResponse {
    pub schema: Arc<Schema>,
    pub results: Vec<RecordBatch>,
    pub execution_time: Duration,
}

impl QueryResponse {
    pub fn row_count(&self) -> usize {
        self.results.iter().map(|b| b.num_rows()).sum()
    }
}

/// Loads captures, runs the overhead pipeline and hosts its tables for SQL.
pub struct AnalysisEngine {
    df_ctx: SessionContext,
    source: Option<CaptureSource>,
    capture_table: String,
    analyzer: Analyzer,
    renderer: Option<Arc<dyn ChartRenderer>>,
    charts: Vec<ChartSpec>,
    tidy_filter: TidyFilter,
    metrics_dump: Option<PathBuf>,
}

impl AnalysisEngine {
    pub fn builder() -> AnalysisEngineBuilder {
        AnalysisEngineBuilder::new()
    }

    /// Create an engine from application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let table = config.classifier.category_table()?;

        let mut builder = Self::builder()
            .source(config.input.source()?)
            .capture_table(&config.input.table)
            .category_table(table)
            .extractor(Arc::new(ProfilerTimingExtractor::new(
                &config.timing.materialize_markers,
            )))
            .options(AnalysisOptions {
                baseline: config.modes.baseline.clone(),
                substitutions: config.modes.substitutions.clone(),
                non_finite: config.analysis.non_finite,
                include_baseline_row: config.analysis.include_baseline_row,
            })
            .tidy_filter(config.presentation.tidy_filter()?)
            .figures_dir(&config.output.figures_dir);

        if let Some(dump) = &config.output.metrics_dump {
            builder = builder.metrics_dump(dump);
        }

        builder.build()
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.df_ctx
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn source(&self) -> Option<&CaptureSource> {
        self.source.as_ref()
    }

    pub fn tidy_filter(&self) -> &TidyFilter {
        &self.tidy_filter
    }

    /// Table holding the captures as read from the source.
    pub fn capture_table(&self) -> &str {
        &self.capture_table
    }

    /// Read the configured capture source.
    ///
    /// The unmodified rows are queryable afterwards under [`Self::capture_table`].
    pub async fn load(&self) -> Result<Vec<CaptureRecord>> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No capture source configured"))?;
        let records = source
            .load(&self.df_ctx, &self.capture_table)
            .await
            .with_context(|| format!("Failed to load captures from {}", source.path().display()))?;
        // file sources are registered by the reader itself
        if let CaptureSource::Duckdb { .. } = source {
            register_batch(&self.df_ctx, &self.capture_table, raw_captures_batch(&records)?)?;
        }
        Ok(records)
    }

    /// Run the pipeline over already loaded captures.
    pub fn analyze(&self, records: Vec<CaptureRecord>) -> Result<AnalysisReport> {
        Ok(self.analyzer.run(records)?)
    }

    /// Expose the report's tables (`captures`, `aggregated`, `metrics`, `tidy`) to SQL.
    pub fn register_report(&self, report: &AnalysisReport) -> Result<()> {
        register_report(&self.df_ctx, report)?;
        Ok(())
    }

    /// Load, analyze and register.
    #[tracing::instrument(name = "run_pipeline", skip(self))]
    pub async fn run(&self) -> Result<AnalysisReport> {
        let records = self.load().await?;
        let report = self.analyze(records)?;
        self.register_report(&report)?;
        Ok(report)
    }

    /// Execute a SQL query and return the results.
    #[tracing::instrument(
        name = "execute_query",
        skip(self, sql),
        fields(lineagebench.rows_returned = tracing::field::Empty)
    )]
    pub async fn sql(&self, sql: &str) -> Result<QueryResponse> {
        info!("Executing query: {}", sql);
        let start = Instant::now();

        let df = self
            .df_ctx
            .sql(sql)
            .instrument(tracing::info_span!("sql_to_dataframe"))
            .await
            .map_err(|e| {
                error!("Error executing query: {}", e);
                e
            })?;

        let schema: Arc<Schema> = Arc::clone(df.schema().inner());

        let results = df
            .collect()
            .instrument(tracing::info_span!("collect_results"))
            .await
            .map_err(|e| {
                error!("Error getting query result: {}", e);
                e
            })?;

        let response = QueryResponse {
            schema,
            execution_time: start.elapsed(),
            results,
        };
        tracing::Span::current().record("lineagebench.rows_returned", response.row_count());
        info!("Execution completed in {:?}", response.execution_time);

        Ok(response)
    }

    /// Per-query avg/max/min of the execute and materialize overheads for one
    /// lineage type at one scale factor. Requires a registered report.
    pub async fn summary(&self, lineage_type: &str, sf: f64) -> Result<QueryResponse> {
        if !sf.is_finite() {
            anyhow::bail!("Summary scale factor must be finite, got {}", sf);
        }
        self.sql(&summary_sql(lineage_type, sf)).await
    }

    /// Write every configured chart; returns the written paths.
    pub fn render_charts(&self, report: &AnalysisReport) -> Result<Vec<PathBuf>> {
        let Some(renderer) = &self.renderer else {
            return Ok(Vec::new());
        };
        let rows = report.charted(&self.tidy_filter);
        let order = self.analyzer.classifier().table().query_order();
        self.charts
            .iter()
            .map(|spec| {
                renderer
                    .render(spec, &rows, &order)
                    .with_context(|| format!("Failed to render chart {}", spec.name))
            })
            .collect()
    }

    /// Write the ordered metrics table as CSV if a dump path is configured.
    pub fn write_metrics_dump(&self, report: &AnalysisReport) -> Result<Option<PathBuf>> {
        let Some(path) = &self.metrics_dump else {
            return Ok(None);
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = WriterBuilder::new().with_header(true).build(file);
        writer.write(&metrics_batch(&report.metrics)?)?;
        info!(path = %path.display(), rows = report.metrics.len(), "metrics written");
        Ok(Some(path.clone()))
    }
}

fn summary_sql(lineage_type: &str, sf: f64) -> String {
    format!(
        "SELECT sf, lineage_type, query, \
         avg(exec_roverhead) AS avg_exec_roverhead, \
         max(exec_roverhead) AS max_exec_roverhead, \
         min(exec_roverhead) AS min_exec_roverhead, \
         avg(exec_overhead) AS avg_exec_overhead, \
         max(exec_overhead) AS max_exec_overhead, \
         min(exec_overhead) AS min_exec_overhead, \
         avg(mat_roverhead) AS avg_mat_roverhead, \
         max(mat_roverhead) AS max_mat_roverhead, \
         min(mat_roverhead) AS min_mat_roverhead \
         FROM {table} \
         WHERE lineage_type = '{lineage}' AND sf = {sf:?} \
         GROUP BY sf, lineage_type, query \
         ORDER BY sf, lineage_type, TRY_CAST(query AS BIGINT), query",
        table = METRICS_TABLE,
        lineage = lineage_type.replace('\'', "''"),
        sf = sf,
    )
}

pub struct AnalysisEngineBuilder {
    source: Option<CaptureSource>,
    capture_table: String,
    category_table: Option<CategoryTable>,
    extractor: Option<Arc<dyn TimingExtractor>>,
    options: AnalysisOptions,
    renderer: Option<Arc<dyn ChartRenderer>>,
    charts: Vec<ChartSpec>,
    tidy_filter: TidyFilter,
    metrics_dump: Option<PathBuf>,
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngineBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            capture_table: DEFAULT_CAPTURE_TABLE.to_string(),
            category_table: None,
            extractor: None,
            options: AnalysisOptions::default(),
            renderer: None,
            charts: ChartSpec::defaults(),
            tidy_filter: TidyFilter::default(),
            metrics_dump: None,
        }
    }

    pub fn source(mut self, source: CaptureSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Name the raw capture table is registered under for file sources.
    /// Defaults to `tpch_capture`.
    pub fn capture_table(mut self, name: impl Into<String>) -> Self {
        self.capture_table = name.into();
        self
    }

    /// Category membership lists. Defaults to the standard TPC-H grouping.
    pub fn category_table(mut self, table: CategoryTable) -> Self {
        self.category_table = Some(table);
        self
    }

    /// Timing extractor. Defaults to [`ProfilerTimingExtractor`] with the
    /// `CREATE` marker.
    pub fn extractor(mut self, extractor: Arc<dyn TimingExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Shorthand for a [`VegaLiteRenderer`] writing into `dir`.
    pub fn figures_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.renderer(Arc::new(VegaLiteRenderer::new(dir)))
    }

    /// Disable chart output.
    pub fn no_charts(mut self) -> Self {
        self.renderer = None;
        self
    }

    pub fn charts(mut self, charts: Vec<ChartSpec>) -> Self {
        self.charts = charts;
        self
    }

    pub fn tidy_filter(mut self, filter: TidyFilter) -> Self {
        self.tidy_filter = filter;
        self
    }

    pub fn metrics_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_dump = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AnalysisEngine> {
        if self.options.baseline.trim().is_empty() {
            anyhow::bail!("Baseline lineage type must not be empty");
        }

        let classifier = Classifier::new(Arc::new(self.category_table.unwrap_or_default()));
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(ProfilerTimingExtractor::default()));

        let df_ctx = SessionContext::new();
        for udf in pipeline_udfs(&classifier, &extractor) {
            df_ctx.register_udf(udf);
        }

        Ok(AnalysisEngine {
            df_ctx,
            source: self.source,
            capture_table: self.capture_table,
            analyzer: Analyzer::new(classifier, extractor, self.options),
            renderer: self.renderer,
            charts: self.charts,
            tidy_filter: self.tidy_filter,
            metrics_dump: self.metrics_dump,
        })
    }
}
