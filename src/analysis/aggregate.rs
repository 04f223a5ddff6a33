//! Reduction of repeated runs into one row per configuration.

use super::EnrichedCapture;
use crate::capture::{QueryId, ScaleFactor};
use crate::classify::QueryCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// Grouping key of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub query: QueryId,
    pub sf: ScaleFactor,
    pub category: QueryCategory,
    pub lineage_type: String,
    pub n_threads: i64,
}

/// Summary of all runs sharing a [`GroupKey`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedGroup {
    pub query: QueryId,
    pub sf: ScaleFactor,
    pub category: QueryCategory,
    pub lineage_type: String,
    pub n_threads: i64,
    pub nchunks: Option<i64>,
    pub lineage_size: Option<i64>,
    pub lineage_count: Option<i64>,
    pub postprocess_time: Option<f64>,
    pub plan_runtime: f64,
    pub runtime: Option<f64>,
    pub output: Option<f64>,
    pub mat_time: f64,
    /// Number of captures folded into this row.
    pub runs: usize,
}

#[derive(Default)]
struct Accumulator {
    nchunks: Option<i64>,
    lineage_size: Option<i64>,
    lineage_count: Option<i64>,
    postprocess_time: Vec<f64>,
    plan_runtime: Vec<f64>,
    runtime: Vec<f64>,
    output: Vec<f64>,
    mat_time: Vec<f64>,
    runs: usize,
}

impl Accumulator {
    fn add(&mut self, capture: &EnrichedCapture) {
        let r = &capture.record;
        self.nchunks = max_opt(self.nchunks, r.nchunks);
        self.lineage_size = max_opt(self.lineage_size, r.lineage_size);
        self.lineage_count = max_opt(self.lineage_count, r.lineage_count);
        self.postprocess_time.extend(r.postprocess_time);
        self.plan_runtime.push(capture.plan_runtime);
        self.runtime.extend(r.runtime);
        self.output.extend(r.output);
        self.mat_time.push(capture.mat_time);
        self.runs += 1;
    }

    fn finish(self, key: GroupKey) -> AggregatedGroup {
        AggregatedGroup {
            query: key.query,
            sf: key.sf,
            category: key.category,
            lineage_type: key.lineage_type,
            n_threads: key.n_threads,
            nchunks: self.nchunks,
            lineage_size: self.lineage_size,
            lineage_count: self.lineage_count,
            postprocess_time: mean(self.postprocess_time),
            plan_runtime: mean(self.plan_runtime).unwrap_or(0.0),
            runtime: mean(self.runtime),
            output: mean(self.output),
            mat_time: mean(self.mat_time).unwrap_or(0.0),
            runs: self.runs,
        }
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Arithmetic mean, `None` when there are no values.
///
/// Values are summed in total order so the result is independent of the
/// order in which runs arrived.
fn mean(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len() as f64;
    Some(values.into_iter().sum::<f64>() / n)
}

/// Group captures by (query, sf, category, lineage type, n_threads).
///
/// Groups come out sorted by key.
pub fn aggregate(captures: &[EnrichedCapture]) -> Vec<AggregatedGroup> {
    let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
    for capture in captures {
        groups
            .entry(capture.group_key())
            .or_default()
            .add(capture);
    }
    groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect()
}

impl EnrichedCapture {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            query: self.record.query.clone(),
            sf: self.record.sf,
            category: self.category,
            lineage_type: self.record.lineage_type.clone(),
            n_threads: self.record.n_threads,
        }
    }
}
