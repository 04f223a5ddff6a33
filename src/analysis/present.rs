//! Long-form reshaping of the overhead table for charting.

use super::overhead::OverheadMetrics;
use crate::capture::{QueryId, ScaleFactor};
use crate::classify::QueryCategory;
use serde::{Deserialize, Serialize};

/// Metric family an overhead value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverheadFamily {
    Total,
    Materialize,
    Execute,
}

impl OverheadFamily {
    pub const ALL: [OverheadFamily; 3] = [Self::Total, Self::Materialize, Self::Execute];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "Total",
            Self::Materialize => "Materialize",
            Self::Execute => "Execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// (overhead, relative overhead) of this family.
    fn values(&self, m: &OverheadMetrics) -> (f64, f64) {
        match self {
            Self::Total => (m.overhead, m.roverhead),
            Self::Materialize => (m.mat_overhead, m.mat_roverhead),
            Self::Execute => (m.exec_overhead, m.exec_roverhead),
        }
    }
}

impl std::fmt::Display for OverheadFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (configuration, family) observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyRow {
    pub overhead_type: OverheadFamily,
    pub qtype: QueryCategory,
    pub qid: QueryId,
    pub sf: ScaleFactor,
    pub n_threads: i64,
    pub output: Option<f64>,
    pub nchunks: Option<i64>,
    pub lineage_size: Option<i64>,
    pub lineage_count: Option<i64>,
    pub postprocess_time: Option<f64>,
    /// Lineage type of the variant.
    pub system: String,
    pub overhead: f64,
    pub roverhead: f64,
}

/// `greatest(0, x)`: negatives (including `-inf`) become zero, NaN stays NaN.
pub fn clamp_non_negative(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

/// Reshape into one row per (metrics row, family), families in
/// Total, Materialize, Execute order, with overheads clamped at zero.
pub fn tidy(metrics: &[OverheadMetrics]) -> Vec<TidyRow> {
    OverheadFamily::ALL
        .iter()
        .flat_map(|family| {
            metrics.iter().map(move |m| {
                let (overhead, roverhead) = family.values(m);
                TidyRow {
                    overhead_type: *family,
                    qtype: m.category,
                    qid: m.query.clone(),
                    sf: m.sf,
                    n_threads: m.n_threads,
                    output: m.output,
                    nchunks: m.nchunks,
                    lineage_size: m.lineage_size,
                    lineage_count: m.lineage_count,
                    postprocess_time: m.postprocess_time,
                    system: m.lineage_type.clone(),
                    overhead: clamp_non_negative(overhead),
                    roverhead: clamp_non_negative(roverhead),
                }
            })
        })
        .collect()
}

/// Selects the tidy rows that go into the charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidyFilter {
    pub families: Vec<OverheadFamily>,
    /// Only keep this thread count; `None` keeps all.
    pub n_threads: Option<i64>,
}

impl TidyFilter {
    /// Everything.
    pub fn all() -> Self {
        Self {
            families: OverheadFamily::ALL.to_vec(),
            n_threads: None,
        }
    }

    /// Apply the filter and order by family name descending
    /// (Total, Materialize, Execute); ties keep their order.
    pub fn apply(&self, rows: &[TidyRow]) -> Vec<TidyRow> {
        let mut out: Vec<TidyRow> = rows
            .iter()
            .filter(|r| self.families.contains(&r.overhead_type))
            .filter(|r| self.n_threads.map_or(true, |n| r.n_threads == n))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.overhead_type.as_str().cmp(a.overhead_type.as_str()));
        out
    }
}

impl Default for TidyFilter {
    /// Total and Execute overheads of single-threaded runs.
    fn default() -> Self {
        Self {
            families: vec![OverheadFamily::Total, OverheadFamily::Execute],
            n_threads: Some(1),
        }
    }
}
