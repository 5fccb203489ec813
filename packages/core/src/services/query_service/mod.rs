//! Query Service - read-only access to the category tree
//!
//! Every query is answered from the `categories` table joined with the
//! closure table; nothing here writes or takes a lock. Each listing is a
//! single statement, so a result never mixes rows from two different
//! mutations.
//!
//! # Examples
//!
//! ```rust,no_run
//! use qbank_core::db::DatabaseService;
//! use qbank_core::services::CategoryQueryService;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = Arc::new(DatabaseService::new("./data/categories.db".into()).await?);
//! let queries = CategoryQueryService::new(db);
//!
//! for tree in queries.materialize_tree(None).await? {
//!     println!("{} ({} categories)", tree.category.name, tree.size());
//! }
//! # Ok(())
//! # }
//! ```

use crate::db::{CategoryStore, DatabaseService};
use crate::models::{build_forest, Category, CategoryId, CategoryTreeNode};
use crate::services::error::CategoryServiceError;
use libsql::Connection;
use std::sync::Arc;

/// Read-only queries over the category tree
#[derive(Debug, Clone)]
pub struct CategoryQueryService {
    db: Arc<DatabaseService>,
}

impl CategoryQueryService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    async fn connection(&self) -> Result<Connection, CategoryServiceError> {
        Ok(self.db.connect_with_timeout().await?)
    }

    async fn require(conn: &Connection, id: CategoryId) -> Result<Category, CategoryServiceError> {
        CategoryStore::get(conn, id)
            .await?
            .ok_or_else(|| CategoryServiceError::not_found(id))
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<Category, CategoryServiceError> {
        let conn = self.connection().await?;
        Self::require(&conn, id).await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        Ok(CategoryStore::get_by_code(&conn, code.trim()).await?)
    }

    /// Strict ancestors of `id`, root first
    pub async fn get_ancestors(&self, id: CategoryId) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        Self::require(&conn, id).await?;
        Ok(CategoryStore::list_ancestors(&conn, id).await?)
    }

    /// Strict descendants of `id`, nearest levels first
    pub async fn get_descendants(
        &self,
        id: CategoryId,
    ) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        Self::require(&conn, id).await?;
        Ok(CategoryStore::list_subtree(&conn, id, false).await?)
    }

    /// `id` followed by all of its descendants
    pub async fn get_subtree(&self, id: CategoryId) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        let subtree = CategoryStore::list_subtree(&conn, id, true).await?;
        if subtree.is_empty() {
            return Err(CategoryServiceError::not_found(id));
        }
        Ok(subtree)
    }

    /// Direct children of `id` in sibling order
    pub async fn get_children(&self, id: CategoryId) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        Self::require(&conn, id).await?;
        Ok(CategoryStore::list_children(&conn, Some(id)).await?)
    }

    /// Other children of the parent of `id` in sibling order, `id` excluded
    pub async fn get_siblings(&self, id: CategoryId) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        let category = Self::require(&conn, id).await?;
        let siblings = CategoryStore::list_children(&conn, category.parent_id).await?;
        Ok(siblings.into_iter().filter(|c| c.id != id).collect())
    }

    pub async fn get_roots(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let conn = self.connection().await?;
        Ok(CategoryStore::list_children(&conn, None).await?)
    }

    /// Nested tree below `root_id`, or the whole forest when `None`
    ///
    /// One flat fetch, then in-memory assembly by `build_forest`.
    pub async fn materialize_tree(
        &self,
        root_id: Option<CategoryId>,
    ) -> Result<Vec<CategoryTreeNode>, CategoryServiceError> {
        let categories = match root_id {
            Some(id) => self.get_subtree(id).await?,
            None => {
                let conn = self.connection().await?;
                CategoryStore::list_all(&conn).await?
            }
        };

        tracing::debug!(
            root_id = ?root_id,
            categories = categories.len(),
            "Materializing category tree"
        );

        Ok(Self::materialize(categories))
    }

    /// Assemble an already fetched flat list into trees
    pub fn materialize(categories: Vec<Category>) -> Vec<CategoryTreeNode> {
        build_forest(categories)
    }
}
