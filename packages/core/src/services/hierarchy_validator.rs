//! Structural checks run by `TreeMutator` before any write
//!
//! Both validators read the closure table through the caller's connection,
//! which during a mutation is the open write transaction. Their answers are
//! therefore current for the write that follows.

use crate::models::CategoryId;
use crate::services::error::CategoryServiceError;
use crate::services::hierarchy_index::HierarchyIndex;
use libsql::Connection;

/// Rejects moves that would make a category its own ancestor
pub struct CycleDetector;

impl CycleDetector {
    /// Fail with `Cycle` when `candidate_parent_id` is `moved_id` itself or
    /// lies inside the subtree of `moved_id`
    pub async fn validate_no_cycle(
        conn: &Connection,
        moved_id: CategoryId,
        candidate_parent_id: CategoryId,
    ) -> Result<(), CategoryServiceError> {
        if moved_id == candidate_parent_id
            || HierarchyIndex::is_descendant(conn, moved_id, candidate_parent_id).await?
        {
            tracing::debug!(
                moved_id,
                candidate_parent_id,
                "Rejected move: candidate parent is inside the moved subtree"
            );
            return Err(CategoryServiceError::cycle(moved_id, candidate_parent_id));
        }
        Ok(())
    }
}

/// Enforces the level ceiling of the tree
pub struct DepthValidator;

impl DepthValidator {
    /// Check the level a new leaf would receive
    pub fn validate_level(level: i64, max_depth: i64) -> Result<(), CategoryServiceError> {
        if level > max_depth {
            return Err(CategoryServiceError::depth_exceeded(level, max_depth));
        }
        Ok(())
    }

    /// Check that the subtree of `moved_id` still fits below a parent at
    /// `candidate_parent_level` (0 when moving to the root level)
    ///
    /// Returns the subtree height including `moved_id` itself.
    pub async fn validate_depth(
        conn: &Connection,
        candidate_parent_level: i64,
        moved_id: CategoryId,
        max_depth: i64,
    ) -> Result<i64, CategoryServiceError> {
        let subtree_height = HierarchyIndex::get_subtree_height(conn, moved_id).await? + 1;
        let deepest_level = candidate_parent_level + subtree_height;

        if deepest_level > max_depth {
            tracing::debug!(
                moved_id,
                candidate_parent_level,
                subtree_height,
                "Rejected move: subtree would exceed maximum depth"
            );
            return Err(CategoryServiceError::depth_exceeded(deepest_level, max_depth));
        }

        Ok(subtree_height)
    }
}
