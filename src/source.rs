use crate::capture::{columns, records_from_batches, CaptureRecord, QueryId, ScaleFactor};
use crate::error::PipelineError;
use datafusion::prelude::{CsvReadOptions, NdJsonReadOptions, ParquetReadOptions, SessionContext};
use duckdb::{AccessMode, Config, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Table holding the captures inside a DuckDB database.
pub const DEFAULT_CAPTURE_TABLE: &str = "tpch_capture";

/// Where benchmark captures are read from.
///
/// The `type` field is the serde discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureSource {
    /// DuckDB database file written by the benchmark harness.
    Duckdb {
        path: PathBuf,
        #[serde(default = "default_table")]
        table: String,
    },
    Csv {
        path: PathBuf,
    },
    Parquet {
        path: PathBuf,
    },
    /// Newline-delimited JSON.
    Json {
        path: PathBuf,
    },
}

fn default_table() -> String {
    DEFAULT_CAPTURE_TABLE.to_string()
}

impl CaptureSource {
    /// Infer the source type from the file extension.
    ///
    /// `.csv`, `.parquet`, `.json`/`.ndjson` map to the file readers;
    /// `.duckdb`, `.db` and extension-less paths are DuckDB databases.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv { path }),
            Some("parquet") => Ok(Self::Parquet { path }),
            Some("json") | Some("ndjson") => Ok(Self::Json { path }),
            Some("duckdb") | Some("db") | None => Ok(Self::Duckdb {
                path,
                table: default_table(),
            }),
            Some(other) => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Build a source of an explicit type (`duckdb`, `csv`, `parquet`, `json`).
    pub fn with_type(
        source_type: &str,
        path: impl Into<PathBuf>,
        table: Option<String>,
    ) -> Result<Self, PipelineError> {
        let path = path.into();
        match source_type.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Self::Duckdb {
                path,
                table: table.unwrap_or_else(default_table),
            }),
            "csv" => Ok(Self::Csv { path }),
            "parquet" => Ok(Self::Parquet { path }),
            "json" | "ndjson" => Ok(Self::Json { path }),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Duckdb { path, .. }
            | Self::Csv { path }
            | Self::Parquet { path }
            | Self::Json { path } => path,
        }
    }

    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Duckdb { .. } => "duckdb",
            Self::Csv { .. } => "csv",
            Self::Parquet { .. } => "parquet",
            Self::Json { .. } => "json",
        }
    }

    /// Read every capture row.
    ///
    /// File formats are registered in `ctx` under `table_name`, so the raw
    /// captures stay queryable afterwards.
    #[tracing::instrument(
        name = "load_captures",
        skip(self, ctx),
        fields(
            lineagebench.source_type = self.source_type(),
            lineagebench.path = %self.path().display(),
        )
    )]
    pub async fn load(
        &self,
        ctx: &SessionContext,
        table_name: &str,
    ) -> Result<Vec<CaptureRecord>, PipelineError> {
        let path = self.path();
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.display().to_string()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::SourceNotFound(path.display().to_string()))?;
        // file readers filter listed files by extension
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let records = match self {
            Self::Duckdb { path, table } => {
                let path = path.clone();
                let table = table.clone();
                tokio::task::spawn_blocking(move || read_duckdb(&path, &table))
                    .await
                    .map_err(|e| PipelineError::Output(format!("duckdb reader panicked: {e}")))??
            }
            Self::Csv { .. } => {
                ctx.deregister_table(table_name)?;
                let options = CsvReadOptions::new().file_extension(&extension);
                ctx.register_csv(table_name, path_str, options).await?;
                read_registered(ctx, table_name).await?
            }
            Self::Parquet { .. } => {
                ctx.deregister_table(table_name)?;
                let options = ParquetReadOptions {
                    file_extension: &extension,
                    ..Default::default()
                };
                ctx.register_parquet(table_name, path_str, options).await?;
                read_registered(ctx, table_name).await?
            }
            Self::Json { .. } => {
                ctx.deregister_table(table_name)?;
                let options = NdJsonReadOptions::default().file_extension(&extension);
                ctx.register_json(table_name, path_str, options).await?;
                read_registered(ctx, table_name).await?
            }
        };

        info!(rows = records.len(), "captures loaded");
        Ok(records)
    }
}

async fn read_registered(
    ctx: &SessionContext,
    table_name: &str,
) -> Result<Vec<CaptureRecord>, PipelineError> {
    let batches = ctx.table(table_name).await?.collect().await?;
    records_from_batches(&batches)
}

/// Read captures from a DuckDB table, casting columns to the expected types.
/// Optional metric columns missing from the table read as NULL.
fn read_duckdb(path: &Path, table: &str) -> Result<Vec<CaptureRecord>, PipelineError> {
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    let conn = Connection::open_with_flags(path, config)?;

    let mut stmt =
        conn.prepare("SELECT lower(column_name) FROM information_schema.columns WHERE table_name = ?")?;
    let present: HashSet<String> = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;
    if present.is_empty() {
        return Err(PipelineError::SourceNotFound(format!(
            "{}:{}",
            path.display(),
            table
        )));
    }
    for column in columns::REQUIRED {
        if !present.contains(*column) {
            return Err(PipelineError::MissingColumn(column.to_string()));
        }
    }

    let select = |column: &str, sql_type: &str| {
        if present.contains(column) {
            format!("CAST(\"{column}\" AS {sql_type}) AS {column}")
        } else {
            format!("CAST(NULL AS {sql_type}) AS {column}")
        }
    };
    let projection = [
        select(columns::QUERY, "VARCHAR"),
        select(columns::SF, "DOUBLE"),
        select(columns::N_THREADS, "BIGINT"),
        select(columns::LINEAGE_TYPE, "VARCHAR"),
        select(columns::PLAN_TIMINGS, "VARCHAR"),
        select(columns::RUNTIME, "DOUBLE"),
        select(columns::OUTPUT, "DOUBLE"),
        select(columns::LINEAGE_SIZE, "BIGINT"),
        select(columns::LINEAGE_COUNT, "BIGINT"),
        select(columns::NCHUNKS, "BIGINT"),
        select(columns::POSTPROCESS_TIME, "DOUBLE"),
    ]
    .join(", ");
    let sql = format!(
        "SELECT {} FROM \"{}\"",
        projection,
        table.replace('"', "\"\"")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Option<String>>(0)?,
            row.get::<_, Option<f64>>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<String>>(3)?,
            CaptureRecord {
                query: QueryId::new(""),
                sf: ScaleFactor::new(0.0),
                n_threads: 0,
                lineage_type: String::new(),
                plan_timings: row.get(4)?,
                runtime: row.get(5)?,
                output: row.get(6)?,
                lineage_size: row.get(7)?,
                lineage_count: row.get(8)?,
                nchunks: row.get(9)?,
                postprocess_time: row.get(10)?,
            },
        ))
    })?;

    let mut records = Vec::new();
    for (row, result) in rows.enumerate() {
        let (query, sf, n_threads, lineage_type, mut record) = result?;
        let null = |column: &str| PipelineError::NullValue {
            column: column.to_string(),
            row,
        };
        record.query = QueryId::new(query.ok_or_else(|| null(columns::QUERY))?);
        record.sf = ScaleFactor::new(sf.ok_or_else(|| null(columns::SF))?);
        record.n_threads = n_threads.ok_or_else(|| null(columns::N_THREADS))?;
        record.lineage_type = lineage_type.ok_or_else(|| null(columns::LINEAGE_TYPE))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert!(matches!(
            CaptureSource::from_path("captures.CSV").unwrap(),
            CaptureSource::Csv { .. }
        ));
        assert!(matches!(
            CaptureSource::from_path("captures.parquet").unwrap(),
            CaptureSource::Parquet { .. }
        ));
        match CaptureSource::from_path("bench.duckdb").unwrap() {
            CaptureSource::Duckdb { table, .. } => assert_eq!(table, "tpch_capture"),
            other => panic!("unexpected source {:?}", other),
        }
        assert!(matches!(
            CaptureSource::from_path("captures.xlsx"),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_serde_tagged() {
        let source: CaptureSource =
            serde_json::from_str(r#"{"type": "duckdb", "path": "bench.db"}"#).unwrap();
        assert_eq!(
            source,
            CaptureSource::Duckdb {
                path: PathBuf::from("bench.db"),
                table: "tpch_capture".to_string()
            }
        );
        let json = serde_json::to_value(CaptureSource::Csv {
            path: PathBuf::from("a.csv"),
        })
        .unwrap();
        assert_eq!(json["type"], "csv");
    }

    #[test]
    fn test_with_type() {
        let source = CaptureSource::with_type("DuckDB", "x.csv", Some("runs".into())).unwrap();
        assert_eq!(source.source_type(), "duckdb");
        assert!(CaptureSource::with_type("excel", "x", None).is_err());
    }
}
