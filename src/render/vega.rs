use super::{ChartRenderer, ChartSpec};
use crate::analysis::TidyRow;
use crate::capture::QueryId;
use crate::error::PipelineError;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SCHEMA_URL: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// Writes self-contained Vega-Lite documents (`<out_dir>/<name>.vl.json`).
///
/// Points are coloured by system, shaped by overhead type and faceted by
/// scale factor (rows) and query category (columns) on a log y axis.
#[derive(Debug, Clone)]
pub struct VegaLiteRenderer {
    out_dir: PathBuf,
}

impl VegaLiteRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Build the chart document without writing it.
    pub fn document(&self, spec: &ChartSpec, rows: &[TidyRow], query_order: &[QueryId]) -> Value {
        let mut skipped = 0usize;
        let values: Vec<Value> = rows
            .iter()
            .filter_map(|row| {
                let y = spec.y_value(row)?;
                if !y.is_finite() {
                    skipped += 1;
                    return None;
                }
                let mut point = json!({
                    "overheadType": row.overhead_type.as_str(),
                    "qtype": row.qtype.as_str(),
                    "qid": row.qid.as_str(),
                    "sf": row.sf.value(),
                    "n_threads": row.n_threads,
                    "system": row.system,
                });
                point[spec.y_field.as_str()] = json!(y);
                Some(point)
            })
            .collect();
        if skipped > 0 {
            warn!(chart = %spec.name, skipped, "non-finite points left out of chart");
        }

        let order: Vec<&str> = query_order.iter().map(QueryId::as_str).collect();
        let mut layers = vec![json!({
            "mark": {"type": "point", "filled": false, "size": 40},
            "encoding": {
                "x": {"field": "qid", "type": "ordinal", "sort": order, "title": "Query"},
                "y": {
                    "field": spec.y_field,
                    "type": "quantitative",
                    "title": spec.y_title,
                    "scale": {"type": "log"},
                    "axis": {"values": spec.breaks},
                },
                "color": {"field": "system", "type": "nominal"},
                "fill": {"field": "system", "type": "nominal"},
                "detail": {"field": "system", "type": "nominal"},
                "shape": {"field": "overheadType", "type": "nominal"},
            },
        })];
        if !spec.reference_lines.is_empty() {
            layers.push(json!({
                "data": {"values": spec.reference_lines.iter().map(|y| json!({"y": y})).collect::<Vec<_>>()},
                "mark": {"type": "rule", "strokeDash": [4, 4], "color": "gray"},
                "encoding": {"y": {"field": "y", "type": "quantitative"}},
            }));
        }

        json!({
            "$schema": SCHEMA_URL,
            "title": spec.name,
            "data": {"values": values},
            "facet": {
                "row": {"field": "sf", "type": "ordinal", "title": "SF"},
                "column": {"field": "qtype", "type": "nominal", "title": null},
            },
            "resolve": {"scale": {"x": "independent"}},
            "spec": {"width": 160, "height": 90, "layer": layers},
            "config": {"legend": {"orient": "top"}},
        })
    }
}

impl ChartRenderer for VegaLiteRenderer {
    fn render(
        &self,
        spec: &ChartSpec,
        rows: &[TidyRow],
        query_order: &[QueryId],
    ) -> Result<PathBuf, PipelineError> {
        let document = self.document(spec, rows, query_order);
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}.vl.json", spec.name));
        std::fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
        info!(path = %path.display(), points = rows.len(), "chart written");
        Ok(path)
    }
}
