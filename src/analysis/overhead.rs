//! Absolute and relative overhead of each variant over Baseline.

use super::baseline::OverheadRow;
use crate::capture::{QueryId, ScaleFactor};
use crate::classify::QueryCategory;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do with rows whose relative overhead is not finite, which happens
/// when the Baseline's non-materialization time is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Keep the row; the IEEE infinity or NaN is the sentinel.
    #[default]
    Propagate,
    /// Drop the row.
    Reject,
}

/// Overhead figures of one variant configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadMetrics {
    pub query: QueryId,
    pub sf: ScaleFactor,
    pub category: QueryCategory,
    pub n_threads: i64,
    pub lineage_type: String,
    /// `output / base_output`, missing when the baseline output is zero or absent.
    pub fanout: Option<f64>,
    pub output: Option<f64>,
    pub nchunks: Option<i64>,
    pub lineage_size: Option<i64>,
    pub lineage_count: Option<i64>,
    pub postprocess_time: Option<f64>,
    /// Execution overhead excluding materialization, in ms.
    pub exec_overhead: f64,
    /// Execution overhead as % of the Baseline's non-materialization time.
    pub exec_roverhead: f64,
    pub mat_overhead: f64,
    pub mat_roverhead: f64,
    /// Total plan overhead, in ms.
    pub overhead: f64,
    pub roverhead: f64,
}

impl OverheadMetrics {
    pub fn from_row(row: &OverheadRow) -> Self {
        let v = &row.variant;
        let base = row.base_plan_no_create;
        let exec_delta = row.plan_no_create - base;
        let mat_delta = v.mat_time - row.base_mat_time;
        let total_delta = v.plan_runtime - row.base_plan_runtime;

        let fanout = match (v.output, row.base_output) {
            (Some(out), Some(base_out)) if base_out != 0.0 => Some(out / base_out),
            _ => None,
        };

        Self {
            query: v.query.clone(),
            sf: v.sf,
            category: v.category,
            n_threads: v.n_threads,
            lineage_type: v.lineage_type.clone(),
            fanout,
            output: v.output,
            nchunks: v.nchunks,
            lineage_size: v.lineage_size,
            lineage_count: v.lineage_count,
            postprocess_time: v.postprocess_time,
            exec_overhead: exec_delta * 1000.0,
            exec_roverhead: exec_delta / base * 100.0,
            mat_overhead: mat_delta * 1000.0,
            mat_roverhead: mat_delta / base * 100.0,
            overhead: total_delta * 1000.0,
            roverhead: total_delta / base * 100.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        [
            self.exec_overhead,
            self.exec_roverhead,
            self.mat_overhead,
            self.mat_roverhead,
            self.overhead,
            self.roverhead,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Result of [`compute_overheads`].
#[derive(Debug, Clone, Default)]
pub struct OverheadTable {
    pub metrics: Vec<OverheadMetrics>,
    /// Rows carrying a non-finite value (kept or rejected per policy).
    pub non_finite: usize,
    pub rejected: usize,
}

/// Compute overheads for every joined row.
///
/// Output is ordered by (category, query, n_threads, lineage type); the sort is
/// stable, so rows that tie keep the join order.
pub fn compute_overheads(rows: &[OverheadRow], policy: NonFinitePolicy) -> OverheadTable {
    let mut table = OverheadTable::default();

    for row in rows {
        let m = OverheadMetrics::from_row(row);
        if !m.is_finite() {
            table.non_finite += 1;
            warn!(
                query = %m.query,
                sf = %m.sf,
                n_threads = m.n_threads,
                lineage_type = %m.lineage_type,
                base_plan_no_create = row.base_plan_no_create,
                policy = ?policy,
                "non-finite overhead"
            );
            if policy == NonFinitePolicy::Reject {
                table.rejected += 1;
                continue;
            }
        }
        table.metrics.push(m);
    }

    table.metrics.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.query.cmp(&b.query))
            .then_with(|| a.n_threads.cmp(&b.n_threads))
            .then_with(|| a.lineage_type.cmp(&b.lineage_type))
    });

    table
}
