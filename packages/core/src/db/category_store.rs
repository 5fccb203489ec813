//! CategoryStore - SQL for the `categories` table
//!
//! All functions take a `&libsql::Connection`. Callers pass either a plain
//! connection (reads) or a `libsql::Transaction`, which derefs to a
//! connection, so every statement of a mutation joins the caller's
//! transaction.
//!
//! This layer knows nothing about hierarchy rules; it reads and writes rows.

use crate::db::error::DatabaseError;
use crate::models::{Category, CategoryId, CategoryType};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{params, Connection, Row, Rows};

const TABLE: &str = "categories";

const CATEGORY_COLUMNS: &str = "c.id, c.name, c.code, c.category_type, c.level, c.parent_id, \
     c.sort_order, c.tree_path, c.description, c.is_active, c.allow_questions, c.version, \
     c.created_at, c.modified_at";

/// Parameters for category insertion (avoids too-many-arguments lint)
pub struct DbInsertCategoryParams<'a> {
    pub name: &'a str,
    pub code: &'a str,
    pub category_type: CategoryType,
    pub level: i64,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i64,
    pub tree_path: &'a str,
    pub description: Option<&'a str>,
    pub allow_questions: bool,
}

/// Parameters for a structural position update
pub struct DbPositionParams<'a> {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub level: i64,
    pub tree_path: &'a str,
    pub sort_order: i64,
}

/// Parameters for a detail (non-structural) update
pub struct DbDetailsParams<'a> {
    pub id: CategoryId,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub is_active: bool,
    pub allow_questions: bool,
}

/// Row-level operations on the `categories` table
pub struct CategoryStore;

fn column_error(field: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::row_conversion(TABLE, format!("column '{}': {}", field, e))
}

fn sql_error(context: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::sql_execution(format!("{}: {}", context, e))
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::row_conversion(
        TABLE,
        format!("unable to parse timestamp '{}'", s),
    ))
}

impl CategoryStore {
    /// Convert a row selected with `CATEGORY_COLUMNS` into a `Category`
    fn row_to_category(row: &Row) -> Result<Category, DatabaseError> {
        let id: i64 = row.get(0).map_err(column_error("id"))?;
        let name: String = row.get(1).map_err(column_error("name"))?;
        let code: String = row.get(2).map_err(column_error("code"))?;
        let category_type: String = row.get(3).map_err(column_error("category_type"))?;
        let level: i64 = row.get(4).map_err(column_error("level"))?;
        let parent_id: Option<i64> = row.get(5).map_err(column_error("parent_id"))?;
        let sort_order: i64 = row.get(6).map_err(column_error("sort_order"))?;
        let tree_path: String = row.get(7).map_err(column_error("tree_path"))?;
        let description: Option<String> = row.get(8).map_err(column_error("description"))?;
        let is_active: i64 = row.get(9).map_err(column_error("is_active"))?;
        let allow_questions: i64 = row.get(10).map_err(column_error("allow_questions"))?;
        let version: i64 = row.get(11).map_err(column_error("version"))?;
        let created_at: String = row.get(12).map_err(column_error("created_at"))?;
        let modified_at: String = row.get(13).map_err(column_error("modified_at"))?;

        let category_type = category_type
            .parse::<CategoryType>()
            .map_err(|e| DatabaseError::row_conversion(TABLE, e.to_string()))?;

        Ok(Category {
            id,
            name,
            code,
            category_type,
            level,
            parent_id,
            sort_order,
            tree_path,
            description,
            is_active: is_active != 0,
            allow_questions: allow_questions != 0,
            version,
            created_at: parse_timestamp(&created_at)?,
            modified_at: parse_timestamp(&modified_at)?,
        })
    }

    async fn collect(mut rows: Rows) -> Result<Vec<Category>, DatabaseError> {
        let mut categories = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("Row fetch failed"))? {
            categories.push(Self::row_to_category(&row)?);
        }
        Ok(categories)
    }

    async fn first(rows: Rows) -> Result<Option<Category>, DatabaseError> {
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    /// Insert a category row and return its new id
    pub async fn insert(
        conn: &Connection,
        params: DbInsertCategoryParams<'_>,
    ) -> Result<CategoryId, DatabaseError> {
        conn.execute(
            "INSERT INTO categories (name, code, category_type, level, parent_id, sort_order, tree_path, description, allow_questions)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                params.name,
                params.code,
                params.category_type.as_str(),
                params.level,
                params.parent_id,
                params.sort_order,
                params.tree_path,
                params.description,
                params.allow_questions as i64
            ],
        )
        .await
        .map_err(sql_error("Failed to insert category"))?;

        Ok(conn.last_insert_rowid())
    }

    /// Fetch one category by id
    pub async fn get(conn: &Connection, id: CategoryId) -> Result<Option<Category>, DatabaseError> {
        let rows = conn
            .query(
                &format!("SELECT {} FROM categories c WHERE c.id = ?", CATEGORY_COLUMNS),
                params![id],
            )
            .await
            .map_err(sql_error("Failed to fetch category"))?;
        Self::first(rows).await
    }

    /// Fetch one category by its unique code
    pub async fn get_by_code(
        conn: &Connection,
        code: &str,
    ) -> Result<Option<Category>, DatabaseError> {
        let rows = conn
            .query(
                &format!("SELECT {} FROM categories c WHERE c.code = ?", CATEGORY_COLUMNS),
                params![code],
            )
            .await
            .map_err(sql_error("Failed to fetch category by code"))?;
        Self::first(rows).await
    }

    /// Children of `parent_id` (roots when `None`), ordered by `sort_order`
    pub async fn list_children(
        conn: &Connection,
        parent_id: Option<CategoryId>,
    ) -> Result<Vec<Category>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM categories c WHERE c.parent_id IS ? ORDER BY c.sort_order, c.id",
                    CATEGORY_COLUMNS
                ),
                params![parent_id],
            )
            .await
            .map_err(sql_error("Failed to list children"))?;
        Self::collect(rows).await
    }

    /// Number of direct children of `parent_id` (roots when `None`)
    pub async fn count_children(
        conn: &Connection,
        parent_id: Option<CategoryId>,
    ) -> Result<i64, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM categories WHERE parent_id IS ?",
                params![parent_id],
            )
            .await
            .map_err(sql_error("Failed to count children"))?;

        match rows.next().await.map_err(sql_error("Row fetch failed"))? {
            Some(row) => row.get::<i64>(0).map_err(column_error("count")),
            None => Ok(0),
        }
    }

    /// Every category, parents before children
    pub async fn list_all(conn: &Connection) -> Result<Vec<Category>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM categories c ORDER BY c.level, c.parent_id, c.sort_order, c.id",
                    CATEGORY_COLUMNS
                ),
                (),
            )
            .await
            .map_err(sql_error("Failed to list categories"))?;
        Self::collect(rows).await
    }

    /// Strict ancestors of `id` through the closure table, root first
    pub async fn list_ancestors(
        conn: &Connection,
        id: CategoryId,
    ) -> Result<Vec<Category>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy h
                     JOIN categories c ON c.id = h.ancestor_id
                     WHERE h.descendant_id = ? AND h.depth > 0
                     ORDER BY h.depth DESC",
                    CATEGORY_COLUMNS
                ),
                params![id],
            )
            .await
            .map_err(sql_error("Failed to list ancestors"))?;
        Self::collect(rows).await
    }

    /// Descendants of `id` through the closure table, nearest first
    ///
    /// With `include_self` the closure self-row contributes `id` itself.
    pub async fn list_subtree(
        conn: &Connection,
        id: CategoryId,
        include_self: bool,
    ) -> Result<Vec<Category>, DatabaseError> {
        let min_depth: i64 = if include_self { 0 } else { 1 };
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy h
                     JOIN categories c ON c.id = h.descendant_id
                     WHERE h.ancestor_id = ? AND h.depth >= ?
                     ORDER BY h.depth, c.parent_id, c.sort_order, c.id",
                    CATEGORY_COLUMNS
                ),
                params![id, min_depth],
            )
            .await
            .map_err(sql_error("Failed to list subtree"))?;
        Self::collect(rows).await
    }

    /// Rewrite parent, level, path and sort order of one category
    pub async fn update_position(
        conn: &Connection,
        params: DbPositionParams<'_>,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories
             SET parent_id = ?, level = ?, tree_path = ?, sort_order = ?,
                 version = version + 1, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                params.parent_id,
                params.level,
                params.tree_path,
                params.sort_order,
                params.id
            ],
        )
        .await
        .map_err(sql_error("Failed to update category position"))?;
        Ok(())
    }

    /// Rewrite level and path of a category that moved with its ancestor
    pub async fn update_level_and_path(
        conn: &Connection,
        id: CategoryId,
        level: i64,
        tree_path: &str,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories
             SET level = ?, tree_path = ?, version = version + 1, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![level, tree_path, id],
        )
        .await
        .map_err(sql_error("Failed to update category path"))?;
        Ok(())
    }

    pub async fn set_sort_order(
        conn: &Connection,
        id: CategoryId,
        sort_order: i64,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories
             SET sort_order = ?, version = version + 1, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![sort_order, id],
        )
        .await
        .map_err(sql_error("Failed to update sort order"))?;
        Ok(())
    }

    pub async fn update_details(
        conn: &Connection,
        params: DbDetailsParams<'_>,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE categories
             SET name = ?, description = ?, is_active = ?, allow_questions = ?,
                 version = version + 1, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                params.name,
                params.description,
                params.is_active as i64,
                params.allow_questions as i64,
                params.id
            ],
        )
        .await
        .map_err(sql_error("Failed to update category details"))?;
        Ok(())
    }

    /// Delete one category row; returns rows affected
    pub async fn delete(conn: &Connection, id: CategoryId) -> Result<u64, DatabaseError> {
        conn.execute("DELETE FROM categories WHERE id = ?", params![id])
            .await
            .map_err(sql_error("Failed to delete category"))
    }

    /// Renumber the children of `parent_id` to `0..n`, keeping their order
    ///
    /// Returns how many rows changed.
    pub async fn compact_sort_orders(
        conn: &Connection,
        parent_id: Option<CategoryId>,
    ) -> Result<usize, DatabaseError> {
        let children = Self::list_children(conn, parent_id).await?;
        let mut changed = 0;

        for (index, child) in children.iter().enumerate() {
            let expected = index as i64;
            if child.sort_order != expected {
                Self::set_sort_order(conn, child.id, expected).await?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_sqlite_format() {
        let ts = parse_timestamp("2026-03-01 12:30:45").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T12:30:45+00:00");
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let ts = parse_timestamp("2026-03-01T12:30:45Z").unwrap();
        assert_eq!(ts.timestamp(), 1772368245);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DatabaseError::RowConversion { .. })
        ));
    }
}
