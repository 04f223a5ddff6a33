//! Chart output for tidy overhead rows.

mod vega;

pub use vega::VegaLiteRenderer;

use crate::analysis::TidyRow;
use crate::capture::QueryId;
use crate::error::PipelineError;
use std::path::PathBuf;

/// Which tidy column a chart plots and how its y axis looks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    /// File stem, e.g. `tpch_roverhead`.
    pub name: String,
    /// Tidy column on the y axis (`roverhead` or `overhead`).
    pub y_field: String,
    pub y_title: String,
    /// Tick values of the log-scaled y axis.
    pub breaks: Vec<f64>,
    /// Horizontal dashed rules.
    pub reference_lines: Vec<f64>,
}

impl ChartSpec {
    /// Relative overhead in percent, with rules at 10% and 20%.
    pub fn relative_overhead() -> Self {
        Self {
            name: "tpch_roverhead".to_string(),
            y_field: "roverhead".to_string(),
            y_title: "Relative Overhead (%)".to_string(),
            breaks: vec![20.0, 100.0, 1000.0],
            reference_lines: vec![10.0, 20.0],
        }
    }

    /// Absolute overhead in milliseconds.
    pub fn overhead() -> Self {
        Self {
            name: "tpch_overhead".to_string(),
            y_field: "overhead".to_string(),
            y_title: "Overhead (ms)".to_string(),
            breaks: vec![10.0, 100.0, 1000.0],
            reference_lines: Vec::new(),
        }
    }

    /// Both charts, relative first.
    pub fn defaults() -> Vec<Self> {
        vec![Self::relative_overhead(), Self::overhead()]
    }

    pub(crate) fn y_value(&self, row: &TidyRow) -> Option<f64> {
        match self.y_field.as_str() {
            "roverhead" => Some(row.roverhead),
            "overhead" => Some(row.overhead),
            _ => None,
        }
    }
}

/// Turns tidy rows into chart files.
pub trait ChartRenderer: std::fmt::Debug + Send + Sync {
    /// Render one chart and return the written path.
    ///
    /// `query_order` fixes the x-axis order of query ids.
    fn render(
        &self,
        spec: &ChartSpec,
        rows: &[TidyRow],
        query_order: &[QueryId],
    ) -> Result<PathBuf, PipelineError>;
}
