use anyhow::Result;
use clap::{Parser, ValueEnum};
use lineagebench::config::{AnalysisConfig, AppConfig};
use lineagebench::datafusion::{AGGREGATED_TABLE, CAPTURES_TABLE, METRICS_TABLE, TIDY_TABLE};
use lineagebench::source::DEFAULT_CAPTURE_TABLE;
use lineagebench::telemetry::{init_telemetry, shutdown_telemetry};
use lineagebench::{AnalysisEngine, QueryResponse};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "lineagebench-repl",
    about = "Interactive SQL over lineage overhead tables",
    version
)]
struct Cli {
    /// SQL query to execute (if provided, runs in non-interactive mode)
    #[arg(short, long)]
    query: Option<String>,

    /// Output format: table (default) or csv
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Capture source: DuckDB database, CSV, Parquet or NDJSON file.
    /// Defaults to the benchmark's DuckDB database tpch_benchmark_capture_may27_e.csv
    #[arg(long)]
    db: Option<String>,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Table,
    Csv,
}

const TABLES: [&str; 4] = [CAPTURES_TABLE, AGGREGATED_TABLE, METRICS_TABLE, TIDY_TABLE];

struct ReplState {
    engine: AnalysisEngine,
    config: AppConfig,
    output: OutputFormat,
}

impl ReplState {
    async fn new(cli: &Cli) -> Result<Self> {
        let mut config = AppConfig::load(cli.config.as_deref())?;
        if let Some(db) = &cli.db {
            config.input.path = db.clone();
        }
        config.validate()?;

        let engine = AnalysisEngine::from_config(&config)?;
        let report = engine.run().await?;
        println!("Loaded {}", report.diagnostics);

        Ok(Self {
            engine,
            config,
            output: cli.output,
        })
    }
}

struct ReplCompleter;

impl ReplCompleter {
    fn get_static_commands(&self) -> Vec<String> {
        ["tables", "describe", "summary", "help", "exit", "quit"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn get_sql_keywords(&self) -> Vec<String> {
        [
            "SELECT", "FROM", "WHERE", "JOIN", "ON", "AND", "OR", "NOT", "IN", "LIKE",
            "GROUP BY", "ORDER BY", "HAVING", "LIMIT", "AS", "DISTINCT", "COUNT", "SUM", "AVG",
            "MIN", "MAX", "WITH", "EXPLAIN", "qtype", "mat_time", "plan_runtime",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Completer for ReplCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);
        let prefix = line[start..pos].to_lowercase();

        let candidates = self
            .get_static_commands()
            .into_iter()
            .chain(self.get_sql_keywords())
            .chain(std::iter::once(DEFAULT_CAPTURE_TABLE.to_string()))
            .chain(TABLES.iter().map(|t| t.to_string()))
            .filter(|word| word.to_lowercase().starts_with(&prefix))
            .map(|word| Pair {
                display: word.clone(),
                replacement: word,
            })
            .collect();

        Ok((start, candidates))
    }
}

impl Helper for ReplCompleter {}
impl Hinter for ReplCompleter {
    type Hint = String;
}
impl Highlighter for ReplCompleter {}
impl Validator for ReplCompleter {}

fn format_results(response: &QueryResponse, format: OutputFormat) -> Result<()> {
    let results = &response.results;
    match format {
        OutputFormat::Table => {
            use datafusion::arrow::util::pretty;
            pretty::print_batches(results)?;
        }
        OutputFormat::Csv => {
            use datafusion::arrow::csv::Writer;
            let mut writer = Writer::new(std::io::stdout());
            for batch in results {
                writer.write(batch)?;
            }
        }
    }
    print_duration_sec(response.execution_time);
    Ok(())
}

fn print_duration_sec(d: Duration) {
    let secs = d.as_secs() as f64 + (d.subsec_micros() as f64 / 1_000_000.0);
    println!("execution time {:.6}", secs);
}

#[tokio::main]
async fn main() {
    // Pipeline logs would interleave with query output
    if let Err(e) = init_telemetry(tracing::Level::WARN) {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let cli = Cli::parse();

    let result = match ReplState::new(&cli).await {
        Ok(state) => match &cli.query {
            Some(query) => handle_query(&state, query).await,
            None => run_repl(state).await,
        },
        Err(e) => Err(e),
    };
    shutdown_telemetry();

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_repl(state: ReplState) -> Result<()> {
    println!("lineagebench SQL shell");
    println!("Type 'help' for commands, 'exit' to quit\n");

    let config = rustyline::Config::builder()
        .completion_type(rustyline::CompletionType::List)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(ReplCompleter));

    let mut exit_request_count = 0;
    loop {
        match rl.readline("lineagebench> ") {
            Ok(line) => {
                exit_request_count = 0;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match handle_command(&state, line).await {
                    Ok(true) => {
                        println!("Goodbye!");
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                if exit_request_count == 1 {
                    println!("Goodbye!");
                    break;
                }
                println!("Press ^C again to exit");
                exit_request_count += 1;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Returns `true` when the shell should exit.
async fn handle_command(state: &ReplState, line: &str) -> Result<bool> {
    let command = line.trim_end_matches(';');
    let mut parts = command.split_whitespace();
    match parts.next().map(str::to_lowercase).as_deref() {
        Some("exit") | Some("quit") => return Ok(true),
        Some("help") => print_help(),
        Some("tables") => {
            println!("  {}", state.engine.capture_table());
            for table in TABLES {
                println!("  {}", table);
            }
        }
        Some("describe") => {
            let table = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("Usage: describe <table>"))?;
            let response = state.engine.sql(&format!("DESCRIBE {}", table)).await?;
            format_results(&response, state.output)?;
        }
        Some("summary") => {
            let (lineage, sf) = summary_args(parts, &state.config.analysis)?;
            let response = state.engine.summary(lineage, sf).await?;
            format_results(&response, state.output)?;
        }
        _ => handle_query(state, line).await?,
    }
    Ok(false)
}

/// `summary [lineage_type] [sf]`, missing arguments taken from the config.
fn summary_args<'a>(
    mut args: impl Iterator<Item = &'a str>,
    analysis: &'a AnalysisConfig,
) -> Result<(&'a str, f64)> {
    let lineage = args.next().unwrap_or(&analysis.summary_lineage_type);
    let sf = match args.next() {
        Some(sf) => sf
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("Invalid scale factor: {}", sf))?,
        None => analysis.summary_sf,
    };
    Ok((lineage, sf))
}

async fn handle_query(state: &ReplState, sql: &str) -> Result<()> {
    let response = state.engine.sql(sql).await?;
    format_results(&response, state.output)
}

fn print_help() {
    println!("Available commands:");
    println!("  tables                       - List the capture and analysis tables");
    println!("  describe <table>             - Show a table's columns");
    println!("  summary [lineage_type] [sf]  - Overhead summary (defaults from config)");
    println!("  SELECT ...                   - Execute SQL query");
    println!("  help                         - Show this help");
    println!("  exit, quit                   - Exit the shell");
    println!();
    println!("SQL functions: qtype(query), mat_time(plan_timings), plan_runtime(plan_timings)");
}
