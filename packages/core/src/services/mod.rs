//! Business Services
//!
//! This module contains the hierarchy engine proper:
//!
//! - `PathCalculator` - Materialized path arithmetic
//! - `HierarchyIndex` - Closure table maintenance and lookups
//! - `CycleDetector` / `DepthValidator` - Structural checks before writes
//! - `TreeMutator` - Atomic create/move/delete/reorder (the only writer)
//! - `CategoryQueryService` - Read-only traversal and tree materialization
//! - `IntegrityChecker` - Audit of every hierarchy invariant
//!
//! Services coordinate between the database layer and callers; all
//! structural rules live here, not in the storage layer.

pub mod error;
pub mod hierarchy_index;
pub mod hierarchy_validator;
pub mod integrity;
pub mod path_calculator;
pub mod query_service;
pub mod tree_mutator;

pub use error::CategoryServiceError;
pub use hierarchy_index::{HierarchyIndex, RebuildStats};
pub use hierarchy_validator::{CycleDetector, DepthValidator};
pub use integrity::{IntegrityChecker, IntegrityIssue, IntegrityReport};
pub use path_calculator::PathCalculator;
pub use query_service::CategoryQueryService;
pub use tree_mutator::TreeMutator;
