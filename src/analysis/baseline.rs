//! Pairing of every aggregated row with its Baseline counterpart.

use super::aggregate::AggregatedGroup;
use crate::capture::{QueryId, ScaleFactor};
use crate::classify::QueryCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Join key: the group key without the lineage type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JoinKey {
    pub query: QueryId,
    pub sf: ScaleFactor,
    pub category: QueryCategory,
    pub n_threads: i64,
}

impl AggregatedGroup {
    pub fn join_key(&self) -> JoinKey {
        JoinKey {
            query: self.query.clone(),
            sf: self.sf,
            category: self.category,
            n_threads: self.n_threads,
        }
    }
}

/// An aggregated row next to the Baseline values of the same configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadRow {
    pub base_plan_runtime: f64,
    pub base_runtime: Option<f64>,
    pub base_output: Option<f64>,
    pub base_mat_time: f64,
    /// `base_plan_runtime - base_mat_time`
    pub base_plan_no_create: f64,
    /// `plan_runtime - mat_time` of the variant
    pub plan_no_create: f64,
    pub variant: AggregatedGroup,
}

impl OverheadRow {
    fn new(base: &AggregatedGroup, variant: &AggregatedGroup) -> Self {
        Self {
            base_plan_runtime: base.plan_runtime,
            base_runtime: base.runtime,
            base_output: base.output,
            base_mat_time: base.mat_time,
            base_plan_no_create: base.plan_runtime - base.mat_time,
            plan_no_create: variant.plan_runtime - variant.mat_time,
            variant: variant.clone(),
        }
    }

    pub fn join_key(&self) -> JoinKey {
        self.variant.join_key()
    }
}

/// Result of [`join_baseline`].
#[derive(Debug, Clone, Default)]
pub struct BaselineJoin {
    pub rows: Vec<OverheadRow>,
    /// Groups dropped because no Baseline row shares their join key.
    pub dropped: Vec<AggregatedGroup>,
    /// Number of Baseline groups seen.
    pub baseline_groups: usize,
}

/// Inner-join every group against the Baseline subset on [`JoinKey`].
///
/// With `include_baseline` the Baseline rows are joined with themselves, which
/// yields all-zero overheads. Rows keep the order of `groups`.
pub fn join_baseline(
    groups: &[AggregatedGroup],
    baseline: &str,
    include_baseline: bool,
) -> BaselineJoin {
    let bases: BTreeMap<JoinKey, &AggregatedGroup> = groups
        .iter()
        .filter(|g| g.lineage_type == baseline)
        .map(|g| (g.join_key(), g))
        .collect();

    let mut join = BaselineJoin {
        baseline_groups: bases.len(),
        ..Default::default()
    };

    for group in groups {
        if group.lineage_type == baseline && !include_baseline {
            continue;
        }
        match bases.get(&group.join_key()) {
            Some(base) => join.rows.push(OverheadRow::new(base, group)),
            None => {
                warn!(
                    query = %group.query,
                    sf = %group.sf,
                    n_threads = group.n_threads,
                    lineage_type = %group.lineage_type,
                    "no {} capture for this configuration, row dropped",
                    baseline
                );
                join.dropped.push(group.clone());
            }
        }
    }

    join
}
