//! Completion of missing lineage modes from substitute captures.

use super::EnrichedCapture;
use crate::capture::QueryId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Relabels `from` captures as `to` for queries that have no `to` capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSubstitution {
    pub from: String,
    pub to: String,
}

impl ModeSubstitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// `Logical-RID` captures stand in for missing `Logical-OPT` ones.
    pub fn rid_for_opt() -> Self {
        Self::new("Logical-RID", "Logical-OPT")
    }
}

/// Append relabeled copies for every substitution rule.
///
/// A query qualifies when none of its captures carries the target mode; the
/// check looks at the query id only, across all scale factors and thread
/// counts. Copies are appended after the original captures. Returns the
/// number of appended rows.
pub fn complete_modes(
    captures: &mut Vec<EnrichedCapture>,
    substitutions: &[ModeSubstitution],
) -> usize {
    let mut appended = 0;

    for sub in substitutions {
        let covered: BTreeSet<QueryId> = captures
            .iter()
            .filter(|c| c.record.lineage_type == sub.to)
            .map(|c| c.record.query.clone())
            .collect();

        let copies: Vec<EnrichedCapture> = captures
            .iter()
            .filter(|c| c.record.lineage_type == sub.from && !covered.contains(&c.record.query))
            .map(|c| {
                let mut copy = c.clone();
                copy.record.lineage_type = sub.to.clone();
                copy
            })
            .collect();

        let queries: BTreeSet<&QueryId> = copies.iter().map(|c| &c.record.query).collect();
        for query in queries {
            info!(
                query = %query,
                from = %sub.from,
                to = %sub.to,
                "no '{}' captures for query, substituting '{}' captures",
                sub.to,
                sub.from
            );
        }

        appended += copies.len();
        captures.extend(copies);
    }

    appended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::capture;

    #[test]
    fn test_rid_copied_when_opt_missing() {
        let mut captures = vec![
            capture("1", "Baseline", 1.0, 0.0),
            capture("1", "Logical-RID", 2.0, 0.5),
            capture("3", "Logical-RID", 3.0, 0.5),
            capture("3", "Logical-OPT", 2.5, 0.25),
        ];
        let appended = complete_modes(&mut captures, &[ModeSubstitution::rid_for_opt()]);
        assert_eq!(appended, 1);
        assert_eq!(captures.len(), 5);

        let copy = &captures[4];
        assert_eq!(copy.record.query.as_str(), "1");
        assert_eq!(copy.record.lineage_type, "Logical-OPT");
        let mut original = captures[1].clone();
        original.record.lineage_type = "Logical-OPT".to_string();
        assert_eq!(copy, &original);
    }

    #[test]
    fn test_check_is_per_query_not_per_configuration() {
        let mut opt = capture("5", "Logical-OPT", 1.0, 0.0);
        opt.record.n_threads = 8;
        let mut captures = vec![capture("5", "Logical-RID", 1.0, 0.0), opt];
        let appended = complete_modes(&mut captures, &[ModeSubstitution::rid_for_opt()]);
        assert_eq!(appended, 0);
    }

    #[test]
    fn test_no_rules_no_change() {
        let mut captures = vec![capture("1", "Logical-RID", 1.0, 0.0)];
        assert_eq!(complete_modes(&mut captures, &[]), 0);
        assert_eq!(captures.len(), 1);
    }
}
