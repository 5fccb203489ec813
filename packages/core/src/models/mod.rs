//! Data Models
//!
//! This module contains the data structures of the category hierarchy:
//!
//! - `Category` - A node of the question-bank tree (row of `categories`)
//! - `HierarchyEdge` - A closure-table row (row of `category_hierarchy`)
//! - `CategoryTreeNode` - Nested tree materialized per request

mod category;
mod hierarchy;
mod tree;

pub use category::{
    validate_category_code, validate_category_name, Category, CategoryId, CategoryType,
    CategoryUpdate, NewCategory, ValidationError, MAX_CATEGORY_DEPTH, MAX_CODE_LENGTH,
    MAX_NAME_LENGTH, ROOT_TREE_PATH,
};
pub use hierarchy::{join_edge_path, HierarchyEdge, EDGE_PATH_SEPARATOR};
pub use tree::{build_forest, CategoryTreeNode};
