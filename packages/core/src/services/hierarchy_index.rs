//! HierarchyIndex - the `category_hierarchy` closure table
//!
//! Stores one row per (ancestor, descendant) pair with the hop count between
//! them, plus a self-row `(id, id, 0)` for every category. The self-row makes
//! "ancestor-or-self" and "subtree including root" queries a plain range scan
//! on the primary key.
//!
//! Rows are derived data. They are only written from inside a `TreeMutator`
//! transaction, alongside the `categories` rows they describe.
//!
//! # Move rebuild
//!
//! When a subtree rooted at `N` moves, rows with both ends inside the subtree
//! keep their depth; only rows linking an outside ancestor to a subtree
//! member change. `rebuild_subtree` deletes exactly those rows for the old
//! ancestor chain and inserts their replacements for the new chain.

use crate::db::DatabaseError;
use crate::models::{join_edge_path, CategoryId, HierarchyEdge, EDGE_PATH_SEPARATOR};
use crate::services::error::CategoryServiceError;
use libsql::{params, Connection, Row, Rows, Value};

const TABLE: &str = "category_hierarchy";

const EDGE_COLUMNS: &str = "ancestor_id, descendant_id, depth, path, is_direct";

/// Row counts touched by `rebuild_subtree`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub subtree_size: usize,
    pub rows_removed: u64,
    pub rows_inserted: u64,
}

pub struct HierarchyIndex;

fn sql_error(context: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::sql_execution(format!("{}: {}", context, e))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl HierarchyIndex {
    fn row_to_edge(row: &Row) -> Result<HierarchyEdge, DatabaseError> {
        let conversion = |field: &'static str| {
            move |e: libsql::Error| {
                DatabaseError::row_conversion(TABLE, format!("column '{}': {}", field, e))
            }
        };

        let ancestor_id: i64 = row.get(0).map_err(conversion("ancestor_id"))?;
        let descendant_id: i64 = row.get(1).map_err(conversion("descendant_id"))?;
        let depth: i64 = row.get(2).map_err(conversion("depth"))?;
        let path: String = row.get(3).map_err(conversion("path"))?;
        let is_direct: i64 = row.get(4).map_err(conversion("is_direct"))?;

        Ok(HierarchyEdge {
            ancestor_id,
            descendant_id,
            depth,
            path,
            is_direct: is_direct != 0,
        })
    }

    async fn collect(mut rows: Rows) -> Result<Vec<HierarchyEdge>, DatabaseError> {
        let mut edges = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("Row fetch failed"))? {
            edges.push(Self::row_to_edge(&row)?);
        }
        Ok(edges)
    }

    async fn insert_edge(conn: &Connection, edge: &HierarchyEdge) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO category_hierarchy (ancestor_id, descendant_id, depth, path, is_direct)
             VALUES (?, ?, ?, ?, ?)",
            params![
                edge.ancestor_id,
                edge.descendant_id,
                edge.depth,
                edge.path.as_str(),
                edge.is_direct as i64
            ],
        )
        .await
        .map_err(sql_error("Failed to insert hierarchy row"))?;
        Ok(())
    }

    /// Insert the rows of a newly created category
    ///
    /// `ancestor_chain` lists the ancestors from the root down to the
    /// immediate parent. The ancestor at index `k` receives depth
    /// `chain.len() - k`, so the immediate parent gets depth 1. Returns the
    /// number of rows written (always `chain.len() + 1`).
    pub async fn insert_node(
        conn: &Connection,
        node_id: CategoryId,
        ancestor_chain: &[CategoryId],
    ) -> Result<u64, DatabaseError> {
        let mut full_chain = ancestor_chain.to_vec();
        full_chain.push(node_id);

        for start in 0..full_chain.len() {
            if let Some(edge) = HierarchyEdge::from_chain(&full_chain[start..]) {
                Self::insert_edge(conn, &edge).await?;
            }
        }

        Ok(full_chain.len() as u64)
    }

    /// Point lookup of a single row
    pub async fn get_edge(
        conn: &Connection,
        ancestor_id: CategoryId,
        descendant_id: CategoryId,
    ) -> Result<Option<HierarchyEdge>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy WHERE ancestor_id = ? AND descendant_id = ?",
                    EDGE_COLUMNS
                ),
                params![ancestor_id, descendant_id],
            )
            .await
            .map_err(sql_error("Failed to fetch hierarchy row"))?;
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    /// True iff `node_id` is a strict descendant of `candidate_ancestor_id`
    pub async fn is_descendant(
        conn: &Connection,
        candidate_ancestor_id: CategoryId,
        node_id: CategoryId,
    ) -> Result<bool, DatabaseError> {
        Ok(Self::get_edge(conn, candidate_ancestor_id, node_id)
            .await?
            .is_some_and(|edge| edge.depth > 0))
    }

    /// Strict-ancestor rows of `node_id`, root first
    pub async fn get_ancestors(
        conn: &Connection,
        node_id: CategoryId,
    ) -> Result<Vec<HierarchyEdge>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy
                     WHERE descendant_id = ? AND depth > 0
                     ORDER BY depth DESC",
                    EDGE_COLUMNS
                ),
                params![node_id],
            )
            .await
            .map_err(sql_error("Failed to fetch ancestor rows"))?;
        Self::collect(rows).await
    }

    /// Strict-descendant rows of `node_id`, nearest first
    pub async fn get_descendants(
        conn: &Connection,
        node_id: CategoryId,
    ) -> Result<Vec<HierarchyEdge>, DatabaseError> {
        Self::subtree_rows(conn, node_id, 1).await
    }

    async fn subtree_rows(
        conn: &Connection,
        node_id: CategoryId,
        min_depth: i64,
    ) -> Result<Vec<HierarchyEdge>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy
                     WHERE ancestor_id = ? AND depth >= ?
                     ORDER BY depth, descendant_id",
                    EDGE_COLUMNS
                ),
                params![node_id, min_depth],
            )
            .await
            .map_err(sql_error("Failed to fetch descendant rows"))?;
        Self::collect(rows).await
    }

    /// Largest depth below `node_id` (0 for a leaf)
    pub async fn get_subtree_height(
        conn: &Connection,
        node_id: CategoryId,
    ) -> Result<i64, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(depth), 0) FROM category_hierarchy WHERE ancestor_id = ?",
                params![node_id],
            )
            .await
            .map_err(sql_error("Failed to compute subtree height"))?;

        match rows.next().await.map_err(sql_error("Row fetch failed"))? {
            Some(row) => row.get::<i64>(0).map_err(|e| {
                DatabaseError::row_conversion(TABLE, format!("subtree height: {}", e))
            }),
            None => Ok(0),
        }
    }

    /// Re-link the subtree rooted at `node_id` from `old_chain` to `new_chain`
    ///
    /// Both chains list ancestors root first, ending with the old and new
    /// parent respectively (empty for a root). Rows internal to the subtree
    /// are left alone.
    ///
    /// Fails with `HierarchyCorrupted` when the rows above the subtree do not
    /// match `old_chain` exactly; the caller's transaction must then roll back.
    pub async fn rebuild_subtree(
        conn: &Connection,
        node_id: CategoryId,
        old_chain: &[CategoryId],
        new_chain: &[CategoryId],
    ) -> Result<RebuildStats, CategoryServiceError> {
        // Includes the self-row, so `node_id` itself is re-linked too
        let subtree = Self::subtree_rows(conn, node_id, 0).await?;
        let member_ids: Vec<CategoryId> = subtree.iter().map(|e| e.descendant_id).collect();

        let mut stats = RebuildStats {
            subtree_size: member_ids.len(),
            ..RebuildStats::default()
        };

        if !old_chain.is_empty() && !member_ids.is_empty() {
            let sql = format!(
                "DELETE FROM category_hierarchy WHERE descendant_id IN ({}) AND ancestor_id IN ({})",
                placeholders(member_ids.len()),
                placeholders(old_chain.len())
            );
            let values: Vec<Value> = member_ids
                .iter()
                .chain(old_chain.iter())
                .map(|id| Value::Integer(*id))
                .collect();

            stats.rows_removed = conn
                .execute(&sql, values)
                .await
                .map_err(sql_error("Failed to delete outer hierarchy rows"))?;

            let expected = (member_ids.len() * old_chain.len()) as u64;
            if stats.rows_removed != expected {
                tracing::warn!(
                    node_id,
                    expected,
                    removed = stats.rows_removed,
                    "Closure rows above moved subtree did not match the old ancestor chain"
                );
                return Err(CategoryServiceError::hierarchy_corrupted(format!(
                    "expected {} closure rows above subtree {}, found {}",
                    expected, node_id, stats.rows_removed
                )));
            }
        }

        let leftover = Self::count_outer_rows(conn, &member_ids).await?;
        if leftover > 0 {
            tracing::warn!(
                node_id,
                leftover,
                "Closure rows link moved subtree to ancestors outside the old chain"
            );
            return Err(CategoryServiceError::hierarchy_corrupted(format!(
                "{} closure rows link subtree {} to ancestors outside its parent chain",
                leftover, node_id
            )));
        }

        for member in &subtree {
            for (k, ancestor_id) in new_chain.iter().enumerate() {
                let hops_to_node = (new_chain.len() - k) as i64;
                let depth = hops_to_node + member.depth;
                let edge = HierarchyEdge {
                    ancestor_id: *ancestor_id,
                    descendant_id: member.descendant_id,
                    depth,
                    path: format!(
                        "{}{}{}",
                        join_edge_path(&new_chain[k..]),
                        EDGE_PATH_SEPARATOR,
                        member.path
                    ),
                    is_direct: depth == 1,
                };
                Self::insert_edge(conn, &edge).await?;
                stats.rows_inserted += 1;
            }
        }

        Ok(stats)
    }

    /// Rows whose descendant is in `member_ids` but whose ancestor is not
    async fn count_outer_rows(
        conn: &Connection,
        member_ids: &[CategoryId],
    ) -> Result<i64, DatabaseError> {
        if member_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM category_hierarchy WHERE descendant_id IN ({0}) AND ancestor_id NOT IN ({0})",
            placeholders(member_ids.len())
        );
        let values: Vec<Value> = member_ids
            .iter()
            .chain(member_ids.iter())
            .map(|id| Value::Integer(*id))
            .collect();

        let mut rows = conn
            .query(&sql, values)
            .await
            .map_err(sql_error("Failed to count outer hierarchy rows"))?;
        match rows.next().await.map_err(sql_error("Row fetch failed"))? {
            Some(row) => row.get::<i64>(0).map_err(|e| {
                DatabaseError::row_conversion(TABLE, format!("outer row count: {}", e))
            }),
            None => Ok(0),
        }
    }

    /// Delete every row whose descendant is one of `ids`
    ///
    /// Passing a whole subtree removes all rows that reference any of its
    /// members, since a row with an ancestor inside the subtree also has its
    /// descendant inside it.
    pub async fn remove_nodes(conn: &Connection, ids: &[CategoryId]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM category_hierarchy WHERE descendant_id IN ({})",
            placeholders(ids.len())
        );
        let values: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();

        conn.execute(&sql, values)
            .await
            .map_err(sql_error("Failed to delete hierarchy rows"))
    }

    /// Every row of the index, ordered by (ancestor, descendant)
    pub async fn list_all(conn: &Connection) -> Result<Vec<HierarchyEdge>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM category_hierarchy ORDER BY ancestor_id, descendant_id",
                    EDGE_COLUMNS
                ),
                (),
            )
            .await
            .map_err(sql_error("Failed to list hierarchy rows"))?;
        Self::collect(rows).await
    }

    /// Drop the whole index and regenerate it from `(id, ancestor_chain)` pairs
    pub async fn rebuild_all(
        conn: &Connection,
        chains: &[(CategoryId, Vec<CategoryId>)],
    ) -> Result<u64, DatabaseError> {
        conn.execute("DELETE FROM category_hierarchy", ())
            .await
            .map_err(sql_error("Failed to clear hierarchy index"))?;

        let mut written = 0;
        for (node_id, chain) in chains {
            written += Self::insert_node(conn, *node_id, chain).await?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseService;
    use tempfile::TempDir;

    async fn test_connection() -> (Connection, DatabaseService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = DatabaseService::new(temp_dir.path().join("index.db"))
            .await
            .unwrap();
        let conn = service.connect_with_timeout().await.unwrap();
        (conn, service, temp_dir)
    }

    /// Insert bare category rows so the closure foreign keys resolve
    async fn seed(conn: &Connection, nodes: &[(CategoryId, Option<CategoryId>, i64)]) {
        for (id, parent_id, level) in nodes {
            conn.execute(
                "INSERT INTO categories (id, name, code, category_type, level, parent_id, tree_path)
                 VALUES (?, ?, ?, 'TOPIC', ?, ?, '/')",
                params![*id, format!("Node {}", id), format!("N{}", id), *level, *parent_id],
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_insert_node_writes_self_and_ancestor_rows() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3)]).await;

        let written = HierarchyIndex::insert_node(&conn, 3, &[1, 2]).await.unwrap();
        assert_eq!(written, 3);

        let self_row = HierarchyIndex::get_edge(&conn, 3, 3).await.unwrap().unwrap();
        assert_eq!(self_row.depth, 0);
        assert_eq!(self_row.path, "3");

        let parent_row = HierarchyIndex::get_edge(&conn, 2, 3).await.unwrap().unwrap();
        assert_eq!(parent_row.depth, 1);
        assert!(parent_row.is_direct);

        let root_row = HierarchyIndex::get_edge(&conn, 1, 3).await.unwrap().unwrap();
        assert_eq!(root_row.depth, 2);
        assert_eq!(root_row.path, "1,2,3");
        assert!(!root_row.is_direct);
    }

    #[tokio::test]
    async fn test_is_descendant_excludes_self() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();

        assert!(HierarchyIndex::is_descendant(&conn, 1, 2).await.unwrap());
        assert!(!HierarchyIndex::is_descendant(&conn, 2, 1).await.unwrap());
        assert!(!HierarchyIndex::is_descendant(&conn, 1, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_ancestors_ordered_root_first() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3), (4, Some(3), 4)]).await;
        HierarchyIndex::insert_node(&conn, 4, &[1, 2, 3]).await.unwrap();

        let ancestors: Vec<_> = HierarchyIndex::get_ancestors(&conn, 4)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.ancestor_id)
            .collect();
        assert_eq!(ancestors, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_subtree_height() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 3, &[1, 2]).await.unwrap();

        assert_eq!(HierarchyIndex::get_subtree_height(&conn, 1).await.unwrap(), 2);
        assert_eq!(HierarchyIndex::get_subtree_height(&conn, 3).await.unwrap(), 0);
        assert_eq!(HierarchyIndex::get_subtree_height(&conn, 99).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_subtree_relinks_outer_rows_only() {
        let (conn, _db, _temp) = test_connection().await;
        seed(
            &conn,
            &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3), (4, Some(3), 4), (5, None, 1)],
        )
        .await;
        // 1 -> 2 -> 3 -> 4, and a second root 5
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 3, &[1, 2]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 4, &[1, 2, 3]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 5, &[]).await.unwrap();

        // Move 3 (with 4) under 5
        let stats = HierarchyIndex::rebuild_subtree(&conn, 3, &[1, 2], &[5])
            .await
            .unwrap();
        assert_eq!(stats.subtree_size, 2);
        assert_eq!(stats.rows_removed, 4);
        assert_eq!(stats.rows_inserted, 2);

        assert!(HierarchyIndex::get_edge(&conn, 1, 3).await.unwrap().is_none());
        assert!(HierarchyIndex::get_edge(&conn, 2, 4).await.unwrap().is_none());

        let internal = HierarchyIndex::get_edge(&conn, 3, 4).await.unwrap().unwrap();
        assert_eq!(internal.depth, 1);
        assert_eq!(internal.path, "3,4");

        let relinked = HierarchyIndex::get_edge(&conn, 5, 4).await.unwrap().unwrap();
        assert_eq!(relinked.depth, 2);
        assert_eq!(relinked.path, "5,3,4");
    }

    #[tokio::test]
    async fn test_rebuild_subtree_to_root() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();

        let stats = HierarchyIndex::rebuild_subtree(&conn, 2, &[1], &[])
            .await
            .unwrap();
        assert_eq!(stats.rows_removed, 1);
        assert_eq!(stats.rows_inserted, 0);
        assert!(HierarchyIndex::get_ancestors(&conn, 2).await.unwrap().is_empty());
        assert!(HierarchyIndex::get_edge(&conn, 2, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rebuild_subtree_rejects_rows_outside_old_chain() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, None, 1), (4, None, 1)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 3, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 4, &[]).await.unwrap();
        // A leftover row claiming 3 is still above 2
        conn.execute(
            "INSERT INTO category_hierarchy (ancestor_id, descendant_id, depth, path, is_direct)
             VALUES (3, 2, 1, '3,2', 1)",
            (),
        )
        .await
        .unwrap();

        let result = HierarchyIndex::rebuild_subtree(&conn, 2, &[1], &[4]).await;
        assert!(matches!(
            result,
            Err(CategoryServiceError::HierarchyCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_subtree_rejects_missing_outer_rows() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3), (4, None, 1)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 3, &[1, 2]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 4, &[]).await.unwrap();
        conn.execute(
            "DELETE FROM category_hierarchy WHERE ancestor_id = 1 AND descendant_id = 3",
            (),
        )
        .await
        .unwrap();

        let result = HierarchyIndex::rebuild_subtree(&conn, 2, &[1], &[4]).await;
        assert!(matches!(
            result,
            Err(CategoryServiceError::HierarchyCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_nodes() {
        let (conn, _db, _temp) = test_connection().await;
        seed(&conn, &[(1, None, 1), (2, Some(1), 2), (3, Some(2), 3)]).await;
        HierarchyIndex::insert_node(&conn, 1, &[]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 2, &[1]).await.unwrap();
        HierarchyIndex::insert_node(&conn, 3, &[1, 2]).await.unwrap();

        let removed = HierarchyIndex::remove_nodes(&conn, &[2, 3]).await.unwrap();
        assert_eq!(removed, 5);

        let remaining = HierarchyIndex::list_all(&conn).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].ancestor_id, 1);
    }
}
