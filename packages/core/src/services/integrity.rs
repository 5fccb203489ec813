//! Read-only audit of the hierarchy invariants
//!
//! `IntegrityChecker::check` loads both tables and recomputes from the
//! `parent_id` links what every path, level and closure row should be.
//! Differences are reported, never repaired; `TreeMutator::rebuild_index`
//! is the repair.

use crate::db::{CategoryStore, DatabaseService};
use crate::models::{join_edge_path, Category, CategoryId, HierarchyEdge};
use crate::services::error::CategoryServiceError;
use crate::services::hierarchy_index::HierarchyIndex;
use crate::services::path_calculator::PathCalculator;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One violated invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityIssue {
    #[serde(rename_all = "camelCase")]
    MissingParent {
        id: CategoryId,
        parent_id: CategoryId,
    },
    #[serde(rename_all = "camelCase")]
    ParentCycle { id: CategoryId },
    #[serde(rename_all = "camelCase")]
    MalformedPath { id: CategoryId, stored: String },
    #[serde(rename_all = "camelCase")]
    PathMismatch {
        id: CategoryId,
        stored: String,
        expected: String,
    },
    #[serde(rename_all = "camelCase")]
    LevelMismatch {
        id: CategoryId,
        stored: i64,
        expected: i64,
    },
    #[serde(rename_all = "camelCase")]
    LevelOutOfRange { id: CategoryId, level: i64 },
    #[serde(rename_all = "camelCase")]
    MissingEdge {
        ancestor_id: CategoryId,
        descendant_id: CategoryId,
        expected_depth: i64,
    },
    #[serde(rename_all = "camelCase")]
    WrongEdgeDepth {
        ancestor_id: CategoryId,
        descendant_id: CategoryId,
        stored: i64,
        expected: i64,
    },
    #[serde(rename_all = "camelCase")]
    WrongEdgePath {
        ancestor_id: CategoryId,
        descendant_id: CategoryId,
        stored: String,
        expected: String,
    },
    #[serde(rename_all = "camelCase")]
    StrayEdge {
        ancestor_id: CategoryId,
        descendant_id: CategoryId,
        depth: i64,
    },
    #[serde(rename_all = "camelCase")]
    SortOrderGap {
        parent_id: Option<CategoryId>,
        sort_orders: Vec<i64>,
    },
}

/// Result of an audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub category_count: usize,
    pub edge_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct IntegrityChecker {
    db: Arc<DatabaseService>,
    max_depth: i64,
}

impl IntegrityChecker {
    pub fn new(db: Arc<DatabaseService>, max_depth: i64) -> Self {
        Self { db, max_depth }
    }

    pub async fn check(&self) -> Result<IntegrityReport, CategoryServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let categories = CategoryStore::list_all(&conn).await?;
        let edges = HierarchyIndex::list_all(&conn).await?;

        let report = audit(&categories, &edges, self.max_depth);
        if report.is_healthy() {
            tracing::info!(
                categories = report.category_count,
                edges = report.edge_count,
                "Category hierarchy is consistent"
            );
        } else {
            tracing::warn!(
                categories = report.category_count,
                issues = report.issues.len(),
                "Category hierarchy has integrity issues"
            );
        }
        Ok(report)
    }
}

/// Ancestor chain of `id` via `parent_id`, root first; `Err` carries the issue
fn parent_chain(
    id: CategoryId,
    parents: &HashMap<CategoryId, Option<CategoryId>>,
) -> Result<Vec<CategoryId>, IntegrityIssue> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([id]);
    let mut current = parents.get(&id).copied().flatten();

    while let Some(parent_id) = current {
        if !seen.insert(parent_id) {
            return Err(IntegrityIssue::ParentCycle { id });
        }
        chain.push(parent_id);
        current = match parents.get(&parent_id) {
            Some(next) => *next,
            None => {
                return Err(IntegrityIssue::MissingParent { id, parent_id });
            }
        };
    }

    chain.reverse();
    Ok(chain)
}

/// Compare stored rows against what the `parent_id` links imply
pub fn audit(categories: &[Category], edges: &[HierarchyEdge], max_depth: i64) -> IntegrityReport {
    let mut issues = Vec::new();

    let parents: HashMap<CategoryId, Option<CategoryId>> =
        categories.iter().map(|c| (c.id, c.parent_id)).collect();

    let mut stored: HashMap<(CategoryId, CategoryId), &HierarchyEdge> = edges
        .iter()
        .map(|e| ((e.ancestor_id, e.descendant_id), e))
        .collect();

    for category in categories {
        if !(1..=max_depth).contains(&category.level) {
            issues.push(IntegrityIssue::LevelOutOfRange {
                id: category.id,
                level: category.level,
            });
        }

        let chain = match parent_chain(category.id, &parents) {
            Ok(chain) => chain,
            Err(issue) => {
                issues.push(issue);
                continue;
            }
        };

        let expected_path = PathCalculator::path_from_chain(&chain);
        if PathCalculator::parse_path(&category.tree_path).is_err() {
            issues.push(IntegrityIssue::MalformedPath {
                id: category.id,
                stored: category.tree_path.clone(),
            });
        } else if category.tree_path != expected_path {
            issues.push(IntegrityIssue::PathMismatch {
                id: category.id,
                stored: category.tree_path.clone(),
                expected: expected_path,
            });
        }

        let expected_level = chain.len() as i64 + 1;
        if category.level != expected_level {
            issues.push(IntegrityIssue::LevelMismatch {
                id: category.id,
                stored: category.level,
                expected: expected_level,
            });
        }

        let mut full_chain = chain;
        full_chain.push(category.id);

        for start in 0..full_chain.len() {
            let ancestor_id = full_chain[start];
            let expected_depth = (full_chain.len() - 1 - start) as i64;

            match stored.remove(&(ancestor_id, category.id)) {
                None => issues.push(IntegrityIssue::MissingEdge {
                    ancestor_id,
                    descendant_id: category.id,
                    expected_depth,
                }),
                Some(edge) if edge.depth != expected_depth => {
                    issues.push(IntegrityIssue::WrongEdgeDepth {
                        ancestor_id,
                        descendant_id: category.id,
                        stored: edge.depth,
                        expected: expected_depth,
                    })
                }
                Some(edge) => {
                    let expected_path = join_edge_path(&full_chain[start..]);
                    if edge.path != expected_path {
                        issues.push(IntegrityIssue::WrongEdgePath {
                            ancestor_id,
                            descendant_id: category.id,
                            stored: edge.path.clone(),
                            expected: expected_path,
                        });
                    }
                }
            }
        }
    }

    let mut strays: Vec<&HierarchyEdge> = stored.into_values().collect();
    strays.sort_by_key(|e| (e.ancestor_id, e.descendant_id));
    issues.extend(strays.into_iter().map(|e| IntegrityIssue::StrayEdge {
        ancestor_id: e.ancestor_id,
        descendant_id: e.descendant_id,
        depth: e.depth,
    }));

    let mut sibling_groups: BTreeMap<Option<CategoryId>, Vec<i64>> = BTreeMap::new();
    for category in categories {
        sibling_groups
            .entry(category.parent_id)
            .or_default()
            .push(category.sort_order);
    }
    for (parent_id, mut sort_orders) in sibling_groups {
        sort_orders.sort_unstable();
        let contiguous = sort_orders
            .iter()
            .enumerate()
            .all(|(index, order)| *order == index as i64);
        if !contiguous {
            issues.push(IntegrityIssue::SortOrderGap {
                parent_id,
                sort_orders,
            });
        }
    }

    IntegrityReport {
        category_count: categories.len(),
        edge_count: edges.len(),
        issues,
    }
}
