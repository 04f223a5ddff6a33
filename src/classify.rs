use crate::capture::QueryId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Semantic category of a TPC-H query.
///
/// Variant order matches label order, so sorting by category sorts by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    JoinsAggregations,
    UncorrelatedSubqueries,
    CorrelatedSubqueries,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 3] = [
        Self::JoinsAggregations,
        Self::UncorrelatedSubqueries,
        Self::CorrelatedSubqueries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinsAggregations => "1. Joins-Aggregations",
            Self::UncorrelatedSubqueries => "2. Uncorrelated subQs",
            Self::CorrelatedSubqueries => "3. Correlated subQs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error building a [`CategoryTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryTableError {
    #[error("query {query} is listed under both '{first}' and '{second}'")]
    Overlap {
        query: QueryId,
        first: QueryCategory,
        second: QueryCategory,
    },
    #[error("query {0} is listed twice under the same category")]
    Duplicate(QueryId),
}

/// Immutable membership lists for the three query categories.
///
/// List order is kept: it defines the x-axis order of the charts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    members: [Vec<QueryId>; 3],
}

impl CategoryTable {
    /// Build a table from three membership lists, rejecting overlaps.
    pub fn new(
        joins_aggregations: Vec<QueryId>,
        uncorrelated_subqueries: Vec<QueryId>,
        correlated_subqueries: Vec<QueryId>,
    ) -> Result<Self, CategoryTableError> {
        let members = [
            joins_aggregations,
            uncorrelated_subqueries,
            correlated_subqueries,
        ];

        let mut seen: Vec<(QueryId, QueryCategory)> = Vec::new();
        for (category, ids) in QueryCategory::ALL.iter().zip(members.iter()) {
            for id in ids {
                if let Some((_, first)) = seen.iter().find(|(q, _)| q == id) {
                    if first == category {
                        return Err(CategoryTableError::Duplicate(id.clone()));
                    }
                    return Err(CategoryTableError::Overlap {
                        query: id.clone(),
                        first: *first,
                        second: *category,
                    });
                }
                seen.push((id.clone(), *category));
            }
        }

        Ok(Self { members })
    }

    /// The standard TPC-H grouping of the 22 benchmark queries.
    pub fn tpch() -> Self {
        let ids = |list: &[u8]| list.iter().map(|n| QueryId::from(*n as i64)).collect::<Vec<_>>();
        Self {
            members: [
                ids(&[1, 3, 5, 6, 7, 8, 9, 10, 12, 13, 14, 19]),
                ids(&[11, 15, 16, 18]),
                ids(&[2, 4, 17, 20, 21, 22]),
            ],
        }
    }

    pub fn members(&self, category: QueryCategory) -> &[QueryId] {
        let idx = QueryCategory::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or(2);
        &self.members[idx]
    }

    /// All listed ids, category 1 first, each category in list order.
    pub fn query_order(&self) -> Vec<QueryId> {
        self.members.iter().flatten().cloned().collect()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::tpch()
    }
}

/// Maps query ids to their category.
///
/// Ids in neither of the first two lists fall through to
/// [`QueryCategory::CorrelatedSubqueries`], including ids the table does not
/// list at all; use [`Classifier::is_known`] to tell the two apart.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<CategoryTable>,
    joins_aggregations: HashSet<QueryId>,
    uncorrelated_subqueries: HashSet<QueryId>,
    known: HashSet<QueryId>,
}

impl Classifier {
    pub fn new(table: Arc<CategoryTable>) -> Self {
        let set = |c| table.members(c).iter().cloned().collect::<HashSet<_>>();
        let joins_aggregations = set(QueryCategory::JoinsAggregations);
        let uncorrelated_subqueries = set(QueryCategory::UncorrelatedSubqueries);
        let known = table.query_order().into_iter().collect();
        Self {
            table,
            joins_aggregations,
            uncorrelated_subqueries,
            known,
        }
    }

    pub fn classify(&self, query: &QueryId) -> QueryCategory {
        if self.joins_aggregations.contains(query) {
            QueryCategory::JoinsAggregations
        } else if self.uncorrelated_subqueries.contains(query) {
            QueryCategory::UncorrelatedSubqueries
        } else {
            QueryCategory::CorrelatedSubqueries
        }
    }

    /// Whether the id appears in any membership list.
    pub fn is_known(&self, query: &QueryId) -> bool {
        self.known.contains(query)
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(CategoryTable::tpch()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<QueryId> {
        (1..=22i64).map(QueryId::from).collect()
    }

    #[test]
    fn test_every_tpch_query_has_one_category() {
        let classifier = Classifier::default();
        let table = classifier.table();
        for id in universe() {
            let category = classifier.classify(&id);
            let listed: Vec<QueryCategory> = QueryCategory::ALL
                .into_iter()
                .filter(|c| table.members(*c).contains(&id))
                .collect();
            assert_eq!(listed, vec![category], "query {}", id);
            assert!(classifier.is_known(&id));
        }
    }

    #[test]
    fn test_tpch_lists_cover_universe() {
        let table = CategoryTable::tpch();
        let mut all = table.query_order();
        all.sort();
        assert_eq!(all, universe());
    }

    #[test]
    fn test_known_assignments() {
        let classifier = Classifier::default();
        assert_eq!(
            classifier.classify(&"1".into()),
            QueryCategory::JoinsAggregations
        );
        assert_eq!(
            classifier.classify(&"18".into()),
            QueryCategory::UncorrelatedSubqueries
        );
        assert_eq!(
            classifier.classify(&"21".into()),
            QueryCategory::CorrelatedSubqueries
        );
    }

    #[test]
    fn test_unknown_id_falls_through() {
        let classifier = Classifier::default();
        let id = QueryId::from("q99");
        assert_eq!(
            classifier.classify(&id),
            QueryCategory::CorrelatedSubqueries
        );
        assert!(!classifier.is_known(&id));
    }

    #[test]
    fn test_overlapping_lists_rejected() {
        let err = CategoryTable::new(
            vec!["1".into(), "2".into()],
            vec!["2".into()],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, CategoryTableError::Overlap { .. }));
    }

    #[test]
    fn test_query_order_follows_lists() {
        let order = CategoryTable::tpch().query_order();
        assert_eq!(order.first().map(QueryId::as_str), Some("1"));
        assert_eq!(order[12].as_str(), "11");
        assert_eq!(order.last().map(QueryId::as_str), Some("22"));
    }

    #[test]
    fn test_label_parse() {
        for c in QueryCategory::ALL {
            assert_eq!(QueryCategory::parse(c.as_str()), Some(c));
        }
        assert_eq!(QueryCategory::parse("4. Other"), None);
    }
}
