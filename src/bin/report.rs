use anyhow::Result;
use clap::{Parser, ValueEnum};
use lineagebench::config::AppConfig;
use lineagebench::datafusion::METRICS_TABLE;
use lineagebench::telemetry::{init_telemetry, shutdown_telemetry};
use lineagebench::{AnalysisEngine, QueryResponse};
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "lineagebench",
    about = "Lineage capture overhead report for TPC-H benchmark runs",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Capture source: DuckDB database, CSV, Parquet or NDJSON file.
    /// Defaults to the benchmark's DuckDB database tpch_benchmark_capture_may27_e.csv
    #[arg(long)]
    db: Option<String>,

    /// Source type, inferred from the extension when omitted
    #[arg(long)]
    format: Option<String>,

    /// Capture table inside a DuckDB database
    #[arg(long)]
    table: Option<String>,

    /// Directory the charts are written to
    #[arg(long)]
    figures_dir: Option<String>,

    /// Write the metrics table as CSV to this path
    #[arg(long)]
    metrics_dump: Option<String>,

    /// Print the raw capture table before the analysis output
    #[arg(long)]
    show_captures: bool,

    /// Skip chart output
    #[arg(long)]
    no_charts: bool,

    /// Chart every thread count instead of the configured one
    #[arg(long)]
    all_threads: bool,

    /// SQL to run over the analysis tables after the pipeline
    #[arg(short, long)]
    query: Option<String>,

    /// Output format: table (default) or csv
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Lineage type of the summary report
    #[arg(long)]
    summary_lineage: Option<String>,

    /// Scale factor of the summary report
    #[arg(long)]
    summary_sf: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Table,
    Csv,
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(db) = &cli.db {
        config.input.path = db.clone();
    }
    if let Some(format) = &cli.format {
        config.input.source_type = Some(format.clone());
    }
    if let Some(table) = &cli.table {
        config.input.table = table.clone();
    }
    if let Some(dir) = &cli.figures_dir {
        config.output.figures_dir = dir.clone();
    }
    if let Some(dump) = &cli.metrics_dump {
        config.output.metrics_dump = Some(dump.clone());
    }
    if cli.all_threads {
        config.presentation.n_threads = None;
    }
    if let Some(lineage) = &cli.summary_lineage {
        config.analysis.summary_lineage_type = lineage.clone();
    }
    if let Some(sf) = cli.summary_sf {
        config.analysis.summary_sf = sf;
    }
}

fn print_response(response: &QueryResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            use datafusion::arrow::util::pretty;
            pretty::print_batches(&response.results)?;
        }
        OutputFormat::Csv => {
            use datafusion::arrow::csv::Writer;
            let mut writer = Writer::new(std::io::stdout());
            for batch in &response.results {
                writer.write(batch)?;
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let engine = AnalysisEngine::from_config(&config)?;
    let report = engine.run().await?;

    if cli.show_captures {
        println!("Captures:");
        let captures = engine
            .sql(&format!("SELECT * FROM {}", engine.capture_table()))
            .await?;
        print_response(&captures, cli.output)?;
    }

    println!("Overhead metrics:");
    let metrics = engine.sql(&format!("SELECT * FROM {}", METRICS_TABLE)).await?;
    print_response(&metrics, cli.output)?;

    println!("{}", report.diagnostics);

    if !cli.no_charts {
        for path in engine.render_charts(&report)? {
            println!("Chart written to {}", path.display());
        }
    }
    if let Some(path) = engine.write_metrics_dump(&report)? {
        println!("Metrics written to {}", path.display());
    }

    println!(
        "Summary ({} at sf={}):",
        config.analysis.summary_lineage_type, config.analysis.summary_sf
    );
    let summary = engine
        .summary(
            &config.analysis.summary_lineage_type,
            config.analysis.summary_sf,
        )
        .await?;
    print_response(&summary, cli.output)?;

    if let Some(sql) = &cli.query {
        let response = engine.sql(sql).await?;
        print_response(&response, cli.output)?;
    }

    tracing::info!("Report finished in {}ms", start.elapsed().as_millis());
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_telemetry(tracing::Level::INFO) {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let result = run(Cli::parse()).await;
    shutdown_telemetry();

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
