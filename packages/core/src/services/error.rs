//! Service Layer Error Types
//!
//! This module defines the error taxonomy of the category hierarchy engine.
//! Every validation failure is detected before any write and leaves the
//! database untouched; only `Database` and `TransactionFailed` describe
//! storage-level trouble.

use crate::db::DatabaseError;
use crate::models::{CategoryId, ValidationError};
use thiserror::Error;

/// Category engine errors
#[derive(Error, Debug)]
pub enum CategoryServiceError {
    /// Referenced category (node or parent) does not exist
    #[error("Category not found: {id}")]
    NotFound { id: CategoryId },

    /// Category code already taken
    #[error("Category code already exists: {code}")]
    DuplicateCode { code: String },

    /// Move would make a category its own ancestor
    #[error("Moving category {node_id} under {new_parent_id} would create a cycle")]
    Cycle {
        node_id: CategoryId,
        new_parent_id: CategoryId,
    },

    /// Resulting level, or subtree height after a move, exceeds the ceiling
    #[error("Depth exceeded: operation would reach level {level}, maximum is {max_depth}")]
    DepthExceeded { level: i64, max_depth: i64 },

    /// Non-cascading delete of a category that still has children
    #[error("Category {id} has {child_count} children; use cascade to delete them")]
    HasChildren { id: CategoryId, child_count: i64 },

    /// Caller supplied arguments inconsistent with the stored tree
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic version check failed
    #[error("Concurrency conflict for category {id}: expected version {expected_version}, found {actual_version}")]
    ConcurrencyConflict {
        id: CategoryId,
        expected_version: i64,
        actual_version: i64,
    },

    /// Input validation failed
    #[error("Category validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Stored rows contradict the hierarchy invariants
    #[error("Hierarchy corrupted: {0}")]
    HierarchyCorrupted(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// Commit or rollback failed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },
}

impl CategoryServiceError {
    pub fn not_found(id: CategoryId) -> Self {
        Self::NotFound { id }
    }

    pub fn duplicate_code(code: impl Into<String>) -> Self {
        Self::DuplicateCode { code: code.into() }
    }

    pub fn cycle(node_id: CategoryId, new_parent_id: CategoryId) -> Self {
        Self::Cycle {
            node_id,
            new_parent_id,
        }
    }

    pub fn depth_exceeded(level: i64, max_depth: i64) -> Self {
        Self::DepthExceeded { level, max_depth }
    }

    pub fn has_children(id: CategoryId, child_count: i64) -> Self {
        Self::HasChildren { id, child_count }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn concurrency_conflict(id: CategoryId, expected_version: i64, actual_version: i64) -> Self {
        Self::ConcurrencyConflict {
            id,
            expected_version,
            actual_version,
        }
    }

    pub fn hierarchy_corrupted(msg: impl Into<String>) -> Self {
        Self::HierarchyCorrupted(msg.into())
    }

    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request
    ///
    /// Only optimistic version conflicts qualify; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CategoryServiceError::not_found(9).to_string(),
            "Category not found: 9"
        );
        assert_eq!(
            CategoryServiceError::cycle(1, 2).to_string(),
            "Moving category 1 under 2 would create a cycle"
        );
        assert_eq!(
            CategoryServiceError::depth_exceeded(7, 6).to_string(),
            "Depth exceeded: operation would reach level 7, maximum is 6"
        );
        assert!(CategoryServiceError::has_children(3, 2)
            .to_string()
            .contains("has 2 children"));
    }

    #[test]
    fn test_validation_error_converts() {
        let err: CategoryServiceError = ValidationError::MissingField("code".into()).into();
        assert!(matches!(err, CategoryServiceError::ValidationFailed(_)));
        assert!(err.to_string().contains("Missing required field: code"));
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(CategoryServiceError::concurrency_conflict(1, 2, 3).is_retryable());
        assert!(!CategoryServiceError::cycle(1, 2).is_retryable());
        assert!(!CategoryServiceError::invalid_argument("x").is_retryable());
    }
}
