//! Closure-table rows
//!
//! One `HierarchyEdge` exists for every (ancestor, descendant) pair in the
//! category tree, plus a self-row `(id, id, depth = 0)` per category.

use super::category::CategoryId;
use serde::{Deserialize, Serialize};

/// Separator used in `HierarchyEdge::path`
pub const EDGE_PATH_SEPARATOR: char = ',';

/// A row of the `category_hierarchy` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyEdge {
    pub ancestor_id: CategoryId,
    pub descendant_id: CategoryId,
    /// Parent hops from ancestor to descendant
    pub depth: i64,
    /// Id chain from ancestor to descendant, e.g. `"1,2,3"`
    pub path: String,
    pub is_direct: bool,
}

impl HierarchyEdge {
    /// Build an edge from the id chain `ancestor, ..., descendant`
    ///
    /// Returns `None` for an empty chain.
    pub fn from_chain(chain: &[CategoryId]) -> Option<Self> {
        let ancestor_id = *chain.first()?;
        let descendant_id = *chain.last()?;
        let depth = (chain.len() - 1) as i64;

        Some(Self {
            ancestor_id,
            descendant_id,
            depth,
            path: join_edge_path(chain),
            is_direct: depth == 1,
        })
    }
}

/// Join an id chain into the comma-separated edge path form
pub fn join_edge_path(chain: &[CategoryId]) -> String {
    chain
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(&EDGE_PATH_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_chain_self_row() {
        let edge = HierarchyEdge::from_chain(&[7]).unwrap();
        assert_eq!(edge.ancestor_id, 7);
        assert_eq!(edge.descendant_id, 7);
        assert_eq!(edge.depth, 0);
        assert_eq!(edge.path, "7");
        assert!(!edge.is_direct);
    }

    #[test]
    fn test_from_chain_multi_hop() {
        let edge = HierarchyEdge::from_chain(&[1, 2, 3]).unwrap();
        assert_eq!(edge.ancestor_id, 1);
        assert_eq!(edge.descendant_id, 3);
        assert_eq!(edge.depth, 2);
        assert_eq!(edge.path, "1,2,3");
        assert!(!edge.is_direct);

        let direct = HierarchyEdge::from_chain(&[2, 3]).unwrap();
        assert!(direct.is_direct);
    }

    #[test]
    fn test_from_chain_empty() {
        assert!(HierarchyEdge::from_chain(&[]).is_none());
    }
}
