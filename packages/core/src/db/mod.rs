//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management (`DatabaseService`)
//! - Row-level SQL for the `categories` table (`CategoryStore`)
//! - Domain events emitted after committed mutations (`CategoryEvent`)
//!
//! The closure table (`category_hierarchy`) is owned by
//! `services::HierarchyIndex`, which shares this layer's connections.

mod category_store;
mod database;
mod error;
pub mod events;

pub use category_store::{
    CategoryStore, DbDetailsParams, DbInsertCategoryParams, DbPositionParams,
};
pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::CategoryEvent;
