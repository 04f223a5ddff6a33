//! The overhead-analysis pipeline.
//!
//! Captures flow through classification and timing extraction, mode
//! completion, aggregation, the Baseline join, overhead computation and the
//! tidy reshape, strictly in that order.

mod aggregate;
mod baseline;
mod completion;
mod overhead;
mod present;

pub use aggregate::{aggregate, AggregatedGroup, GroupKey};
pub use baseline::{join_baseline, BaselineJoin, JoinKey, OverheadRow};
pub use completion::{complete_modes, ModeSubstitution};
pub use overhead::{compute_overheads, NonFinitePolicy, OverheadMetrics, OverheadTable};
pub use present::{clamp_non_negative, tidy, OverheadFamily, TidyFilter, TidyRow};

use crate::capture::{CaptureRecord, QueryId, BASELINE};
use crate::classify::{Classifier, QueryCategory};
use crate::error::PipelineError;
use crate::timing::{ProfilerTimingExtractor, TimingExtractor};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A capture with its category and extracted timings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCapture {
    pub record: CaptureRecord,
    pub category: QueryCategory,
    /// Seconds spent materializing lineage.
    pub mat_time: f64,
    /// Seconds spent executing the plan.
    pub plan_runtime: f64,
}

/// Counters for the silent degradations of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub captures: usize,
    pub substituted: usize,
    pub groups: usize,
    pub dropped_without_baseline: usize,
    pub non_finite_rows: usize,
    pub rejected_rows: usize,
    pub unknown_queries: BTreeSet<QueryId>,
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} captures ({} substituted), {} groups, {} dropped without baseline, \
             {} non-finite ({} rejected), {} unknown queries",
            self.captures,
            self.substituted,
            self.groups,
            self.dropped_without_baseline,
            self.non_finite_rows,
            self.rejected_rows,
            self.unknown_queries.len()
        )
    }
}

/// Every intermediate table of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Enriched captures, substitutions included.
    pub captures: Vec<EnrichedCapture>,
    pub aggregated: Vec<AggregatedGroup>,
    pub joined: Vec<OverheadRow>,
    pub metrics: Vec<OverheadMetrics>,
    /// All families, all thread counts.
    pub tidy: Vec<TidyRow>,
    pub diagnostics: Diagnostics,
}

impl AnalysisReport {
    /// Tidy rows selected for charting.
    pub fn charted(&self, filter: &TidyFilter) -> Vec<TidyRow> {
        filter.apply(&self.tidy)
    }
}

/// Tunables of the analysis stages.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub baseline: String,
    pub substitutions: Vec<ModeSubstitution>,
    pub non_finite: NonFinitePolicy,
    /// Join Baseline rows with themselves (all-zero overheads).
    pub include_baseline_row: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            baseline: BASELINE.to_string(),
            substitutions: vec![ModeSubstitution::rid_for_opt()],
            non_finite: NonFinitePolicy::Propagate,
            include_baseline_row: true,
        }
    }
}

/// Runs the pipeline stages with an injected classifier and extractor.
#[derive(Debug, Clone)]
pub struct Analyzer {
    classifier: Classifier,
    extractor: Arc<dyn TimingExtractor>,
    options: AnalysisOptions,
}

impl Analyzer {
    pub fn new(
        classifier: Classifier,
        extractor: Arc<dyn TimingExtractor>,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            classifier,
            extractor,
            options,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &Arc<dyn TimingExtractor> {
        &self.extractor
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Attach category and timings to each capture.
    pub fn enrich(&self, records: Vec<CaptureRecord>) -> Vec<EnrichedCapture> {
        records
            .into_iter()
            .map(|record| {
                let blob = record.plan_timings.as_deref().unwrap_or("");
                EnrichedCapture {
                    category: self.classifier.classify(&record.query),
                    mat_time: self.extractor.extract_materialize_time(blob),
                    plan_runtime: self.extractor.extract_total_exec_time(blob),
                    record,
                }
            })
            .collect()
    }

    /// Run every stage over `records`.
    #[tracing::instrument(name = "analyze", skip(self, records), fields(captures = records.len()))]
    pub fn run(&self, records: Vec<CaptureRecord>) -> Result<AnalysisReport, PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::EmptyCaptures);
        }
        let mut diagnostics = Diagnostics::default();

        for record in &records {
            if !self.classifier.is_known(&record.query)
                && diagnostics.unknown_queries.insert(record.query.clone())
            {
                warn!(
                    query = %record.query,
                    category = %self.classifier.classify(&record.query),
                    "query id not in any category list, using fallback category"
                );
            }
        }

        let mut captures = self.enrich(records);
        diagnostics.substituted = complete_modes(&mut captures, &self.options.substitutions);
        diagnostics.captures = captures.len();

        let aggregated = aggregate(&captures);
        diagnostics.groups = aggregated.len();

        let join = join_baseline(
            &aggregated,
            &self.options.baseline,
            self.options.include_baseline_row,
        );
        if join.baseline_groups == 0 {
            return Err(PipelineError::MissingBaseline(self.options.baseline.clone()));
        }
        diagnostics.dropped_without_baseline = join.dropped.len();

        let table = compute_overheads(&join.rows, self.options.non_finite);
        diagnostics.non_finite_rows = table.non_finite;
        diagnostics.rejected_rows = table.rejected;

        let tidy = tidy(&table.metrics);

        info!(%diagnostics, "analysis complete");

        Ok(AnalysisReport {
            captures,
            aggregated,
            joined: join.rows,
            metrics: table.metrics,
            tidy,
            diagnostics,
        })
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(
            Classifier::default(),
            Arc::new(ProfilerTimingExtractor::default()),
            AnalysisOptions::default(),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Enriched capture at sf 1, one thread, with the given timings.
    pub(crate) fn capture(
        query: &str,
        lineage_type: &str,
        plan_runtime: f64,
        mat_time: f64,
    ) -> EnrichedCapture {
        let record = CaptureRecord::new(query, 1.0, 1, lineage_type, None);
        EnrichedCapture {
            category: Classifier::default().classify(&record.query),
            record,
            mat_time,
            plan_runtime,
        }
    }

    fn record(query: &str, lineage_type: &str, total: f64, create: f64) -> CaptureRecord {
        let blob = format!(
            r#"{{"children": [{{"name": "CREATE_TABLE_AS", "timing": {create},
                "children": [{{"name": "SEQ_SCAN", "timing": {scan}}}]}}]}}"#,
            scan = total - create
        );
        CaptureRecord::new(query, 1.0, 1, lineage_type, Some(blob))
    }

    #[test]
    fn test_end_to_end() {
        let report = Analyzer::default()
            .run(vec![
                record("1", "Baseline", 10.0, 4.0),
                record("1", "Logical-RID", 15.0, 5.0),
                record("2", "Baseline", 2.0, 0.0),
                record("2", "Logical-OPT", 3.0, 0.5),
            ])
            .unwrap();

        assert_eq!(report.diagnostics.substituted, 1);
        assert_eq!(report.diagnostics.captures, 5);
        assert_eq!(report.aggregated.len(), 5);
        assert_eq!(report.metrics.len(), 5);
        assert_eq!(report.tidy.len(), 15);

        let opt = report
            .metrics
            .iter()
            .find(|m| m.query.as_str() == "1" && m.lineage_type == "Logical-OPT")
            .unwrap();
        assert_eq!(opt.exec_overhead, 4000.0);
        assert_eq!(opt.overhead, 5000.0);

        let base = report
            .metrics
            .iter()
            .find(|m| m.query.as_str() == "1" && m.lineage_type == "Baseline")
            .unwrap();
        assert_eq!(base.overhead, 0.0);
        assert_eq!(base.roverhead, 0.0);
    }

    #[test]
    fn test_missing_baseline_is_error() {
        let err = Analyzer::default()
            .run(vec![record("1", "Logical-RID", 1.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingBaseline(b) if b == "Baseline"));
    }

    #[test]
    fn test_empty_is_error() {
        assert!(matches!(
            Analyzer::default().run(vec![]),
            Err(PipelineError::EmptyCaptures)
        ));
    }

    #[test]
    fn test_unknown_queries_reported() {
        let report = Analyzer::default()
            .run(vec![
                record("Q1", "Baseline", 1.0, 0.0),
                record("1", "Baseline", 1.0, 0.0),
            ])
            .unwrap();
        let unknown: Vec<&str> = report
            .diagnostics
            .unknown_queries
            .iter()
            .map(QueryId::as_str)
            .collect();
        assert_eq!(unknown, vec!["Q1"]);
    }

    #[test]
    fn test_substitution_matches_source_aggregate() {
        let report = Analyzer::default()
            .run(vec![
                record("7", "Baseline", 2.0, 0.0),
                record("7", "Logical-RID", 3.0, 1.0),
                record("7", "Logical-RID", 5.0, 1.0),
            ])
            .unwrap();
        let rid = report
            .aggregated
            .iter()
            .find(|g| g.lineage_type == "Logical-RID")
            .unwrap();
        let opt = report
            .aggregated
            .iter()
            .find(|g| g.lineage_type == "Logical-OPT")
            .unwrap();
        let mut relabeled = rid.clone();
        relabeled.lineage_type = "Logical-OPT".to_string();
        assert_eq!(&relabeled, opt);
    }
}
