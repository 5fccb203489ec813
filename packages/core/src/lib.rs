//! Question Bank Category Hierarchy Engine
//!
//! This crate keeps a tree of question-bank categories (subject, chapter,
//! topic, ...) consistent under concurrent structural edits.
//!
//! # Architecture
//!
//! - **Two tables**: `categories` holds the nodes with a materialized
//!   `tree_path`; `category_hierarchy` is a closure table with one row per
//!   ancestor/descendant pair plus a self-row per node
//! - **Single writer**: `TreeMutator` runs every mutation as one
//!   `BEGIN IMMEDIATE` transaction after validating cycles and depth
//! - **libsql**: Embedded SQLite-compatible database
//! - **Per-request trees**: nested trees are rebuilt from one flat fetch,
//!   never cached or mutated in place
//!
//! # Modules
//!
//! - [`models`] - Data structures (Category, HierarchyEdge, CategoryTreeNode)
//! - [`services`] - Hierarchy engine (TreeMutator, CategoryQueryService, ...)
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Engine configuration
//! - [`engine`] - `CategoryEngine` facade

pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::CategoryEngine;
pub use models::*;
pub use services::*;
