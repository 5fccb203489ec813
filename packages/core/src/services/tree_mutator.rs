//! TreeMutator - the only writer of the category tree
//!
//! Every mutation follows the same shape:
//!
//! 1. Take the in-process write lock
//! 2. Open a `BEGIN IMMEDIATE` transaction (SQLite write lock)
//! 3. Read and validate everything the mutation depends on
//! 4. Write node rows and closure rows
//! 5. Commit, or roll back on the first error
//! 6. Emit a `CategoryEvent`
//!
//! Validation reads happen only after both locks are held, so two
//! overlapping moves can never both pass the cycle check against the same
//! stale ancestor chain.

use crate::config::EngineConfig;
use crate::db::{
    CategoryEvent, CategoryStore, DatabaseService, DbDetailsParams, DbInsertCategoryParams,
    DbPositionParams,
};
use crate::models::{
    validate_category_name, Category, CategoryId, CategoryUpdate, NewCategory, ROOT_TREE_PATH,
};
use crate::services::error::CategoryServiceError;
use crate::services::hierarchy_index::HierarchyIndex;
use crate::services::hierarchy_validator::{CycleDetector, DepthValidator};
use crate::services::path_calculator::PathCalculator;
use libsql::{Connection, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::Instrument;
use uuid::Uuid;

/// Result of a move inside its transaction
struct MoveOutcome {
    category: Category,
    old_parent_id: Option<CategoryId>,
    affected_ids: Vec<CategoryId>,
}

/// Orchestrates create/move/delete/reorder as single atomic units
#[derive(Clone)]
pub struct TreeMutator {
    db: Arc<DatabaseService>,

    /// Deepest allowed level
    max_depth: i64,

    /// Serializes mutations made through this process; shared by clones
    write_lock: Arc<Mutex<()>>,

    event_tx: broadcast::Sender<CategoryEvent>,

    /// When set, emitted events carry this as `source_client_id`
    client_id: Option<String>,
}

fn operation_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("category_mutation", operation, operation_id = %Uuid::new_v4())
}

/// Ancestor ids of `id` read from the closure table, root first
async fn ancestor_chain(
    conn: &Connection,
    id: CategoryId,
) -> Result<Vec<CategoryId>, CategoryServiceError> {
    Ok(HierarchyIndex::get_ancestors(conn, id)
        .await?
        .into_iter()
        .map(|edge| edge.ancestor_id)
        .collect())
}

/// Ancestor chain a child of `parent` receives
async fn chain_below(
    conn: &Connection,
    parent: Option<&Category>,
) -> Result<Vec<CategoryId>, CategoryServiceError> {
    match parent {
        Some(parent) => {
            let mut chain = ancestor_chain(conn, parent.id).await?;
            chain.push(parent.id);
            Ok(chain)
        }
        None => Ok(Vec::new()),
    }
}

fn path_below(parent: Option<&Category>) -> String {
    match parent {
        Some(parent) => PathCalculator::compute_path(&parent.tree_path, Some(parent.id)),
        None => PathCalculator::compute_path(ROOT_TREE_PATH, None),
    }
}

async fn fetch(conn: &Connection, id: CategoryId) -> Result<Category, CategoryServiceError> {
    CategoryStore::get(conn, id)
        .await?
        .ok_or_else(|| CategoryServiceError::not_found(id))
}

async fn fetch_parent(
    conn: &Connection,
    parent_id: Option<CategoryId>,
) -> Result<Option<Category>, CategoryServiceError> {
    match parent_id {
        Some(parent_id) => Ok(Some(fetch(conn, parent_id).await?)),
        None => Ok(None),
    }
}

fn check_version(
    category: &Category,
    expected_version: Option<i64>,
) -> Result<(), CategoryServiceError> {
    match expected_version {
        Some(expected) if expected != category.version => Err(
            CategoryServiceError::concurrency_conflict(category.id, expected, category.version),
        ),
        _ => Ok(()),
    }
}

impl TreeMutator {
    pub fn new(db: Arc<DatabaseService>, config: &EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            db,
            max_depth: config.max_depth,
            write_lock: Arc::new(Mutex::new(())),
            event_tx,
            client_id: None,
        }
    }

    /// Clone of this mutator whose events carry `client_id`
    ///
    /// The clone shares the write lock and event channel with the original.
    pub fn with_client(&self, client_id: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.client_id = Some(client_id.into());
        cloned
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<CategoryEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors: having no subscribers is normal.
    fn emit_event(&self, event: CategoryEvent) {
        tracing::debug!(event_type = event.event_type(), "Emitting category event");
        let _ = self.event_tx.send(event);
    }

    async fn begin_write(&self) -> Result<(MutexGuard<'_, ()>, Transaction), CategoryServiceError> {
        let guard = self.write_lock.lock().await;
        let conn = self.db.connect_with_timeout().await?;
        let tx = DatabaseService::begin_immediate(&conn).await?;
        Ok((guard, tx))
    }

    /// Commit on success, roll back on failure
    async fn finish<T>(
        tx: Transaction,
        result: Result<T, CategoryServiceError>,
    ) -> Result<T, CategoryServiceError> {
        match result {
            Ok(value) => {
                tx.commit().await.map_err(|e| {
                    CategoryServiceError::transaction_failed(format!("commit failed: {}", e))
                })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                tracing::debug!(error = %err, "Mutation rolled back");
                Err(err)
            }
        }
    }

    /// Create a category under `input.parent_id` (or as a root)
    ///
    /// The new category is appended after its existing siblings.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the parent does not exist
    /// - `DuplicateCode` if the code is taken
    /// - `DepthExceeded` if the new level would pass the ceiling
    /// - `ValidationFailed` for a bad name or code
    pub async fn create_category(
        &self,
        input: NewCategory,
    ) -> Result<Category, CategoryServiceError> {
        let span = operation_span("create_category");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self.create_in_tx(&tx, &input).await;
            let category = Self::finish(tx, result).await?;

            tracing::info!(
                category_id = category.id,
                parent_id = ?category.parent_id,
                level = category.level,
                "Created category"
            );
            self.emit_event(CategoryEvent::Created {
                category: category.clone(),
                source_client_id: self.client_id.clone(),
            });
            Ok(category)
        }
        .instrument(span)
        .await
    }

    async fn create_in_tx(
        &self,
        conn: &Connection,
        input: &NewCategory,
    ) -> Result<Category, CategoryServiceError> {
        let (name, code) = input.validate()?;

        let parent = fetch_parent(conn, input.parent_id).await?;

        if CategoryStore::get_by_code(conn, &code).await?.is_some() {
            return Err(CategoryServiceError::duplicate_code(code));
        }

        let level = parent.as_ref().map_or(1, |p| p.level + 1);
        DepthValidator::validate_level(level, self.max_depth)?;

        let tree_path = path_below(parent.as_ref());
        let sort_order = CategoryStore::count_children(conn, input.parent_id).await?;

        let id = CategoryStore::insert(
            conn,
            DbInsertCategoryParams {
                name: &name,
                code: &code,
                category_type: input.category_type,
                level,
                parent_id: input.parent_id,
                sort_order,
                tree_path: &tree_path,
                description: input.description.as_deref(),
                allow_questions: input.allow_questions,
            },
        )
        .await?;

        let chain = chain_below(conn, parent.as_ref()).await?;
        HierarchyIndex::insert_node(conn, id, &chain).await?;

        fetch(conn, id).await
    }

    /// Move `id` (with its whole subtree) under `new_parent_id`, or to the
    /// root level when `None`
    ///
    /// Moving onto the current parent is a no-op. Otherwise the category is
    /// appended after the new siblings and the old siblings are compacted.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category or new parent does not exist
    /// - `Cycle` if the new parent is the category or one of its descendants
    /// - `DepthExceeded` if the deepest descendant would pass the ceiling
    pub async fn move_category(
        &self,
        id: CategoryId,
        new_parent_id: Option<CategoryId>,
    ) -> Result<Category, CategoryServiceError> {
        self.move_inner(id, new_parent_id, None).await
    }

    /// `move_category` guarded by an optimistic version check
    ///
    /// Fails with `ConcurrencyConflict` when the stored version of `id`
    /// differs from `expected_version`.
    pub async fn move_category_checked(
        &self,
        id: CategoryId,
        new_parent_id: Option<CategoryId>,
        expected_version: i64,
    ) -> Result<Category, CategoryServiceError> {
        self.move_inner(id, new_parent_id, Some(expected_version))
            .await
    }

    async fn move_inner(
        &self,
        id: CategoryId,
        new_parent_id: Option<CategoryId>,
        expected_version: Option<i64>,
    ) -> Result<Category, CategoryServiceError> {
        let span = operation_span("move_category");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self
                .move_in_tx(&tx, id, new_parent_id, expected_version)
                .await;
            let outcome = Self::finish(tx, result).await?;

            if outcome.affected_ids.is_empty() {
                tracing::debug!(category_id = id, "Move onto current parent; nothing to do");
                return Ok(outcome.category);
            }

            tracing::info!(
                category_id = id,
                old_parent_id = ?outcome.old_parent_id,
                new_parent_id = ?new_parent_id,
                affected = outcome.affected_ids.len(),
                "Moved category subtree"
            );
            self.emit_event(CategoryEvent::Moved {
                category: outcome.category.clone(),
                old_parent_id: outcome.old_parent_id,
                affected_ids: outcome.affected_ids,
                source_client_id: self.client_id.clone(),
            });
            Ok(outcome.category)
        }
        .instrument(span)
        .await
    }

    async fn move_in_tx(
        &self,
        conn: &Connection,
        id: CategoryId,
        new_parent_id: Option<CategoryId>,
        expected_version: Option<i64>,
    ) -> Result<MoveOutcome, CategoryServiceError> {
        let node = fetch(conn, id).await?;
        check_version(&node, expected_version)?;

        let old_parent_id = node.parent_id;
        if old_parent_id == new_parent_id {
            return Ok(MoveOutcome {
                category: node,
                old_parent_id,
                affected_ids: Vec::new(),
            });
        }

        let new_parent = fetch_parent(conn, new_parent_id).await?;

        if let Some(parent_id) = new_parent_id {
            CycleDetector::validate_no_cycle(conn, id, parent_id).await?;
        }

        let parent_level = new_parent.as_ref().map_or(0, |p| p.level);
        DepthValidator::validate_depth(conn, parent_level, id, self.max_depth).await?;

        let new_level = parent_level + 1;
        let new_path = path_below(new_parent.as_ref());
        let level_delta = new_level - node.level;
        let old_prefix = node.subtree_prefix();
        let new_prefix = PathCalculator::compute_path(&new_path, Some(id));

        let descendants = CategoryStore::list_subtree(conn, id, false).await?;
        let mut affected_ids = Vec::with_capacity(descendants.len() + 1);
        affected_ids.push(id);

        for descendant in &descendants {
            let rebased = PathCalculator::rebase(&descendant.tree_path, &old_prefix, &new_prefix)
                .ok_or_else(|| {
                    CategoryServiceError::hierarchy_corrupted(format!(
                        "descendant {} of {} has path '{}' outside subtree prefix '{}'",
                        descendant.id, id, descendant.tree_path, old_prefix
                    ))
                })?;
            CategoryStore::update_level_and_path(
                conn,
                descendant.id,
                descendant.level + level_delta,
                &rebased,
            )
            .await?;
            affected_ids.push(descendant.id);
        }

        let old_chain = ancestor_chain(conn, id).await?;
        let new_chain = chain_below(conn, new_parent.as_ref()).await?;

        let sort_order = CategoryStore::count_children(conn, new_parent_id).await?;
        CategoryStore::update_position(
            conn,
            DbPositionParams {
                id,
                parent_id: new_parent_id,
                level: new_level,
                tree_path: &new_path,
                sort_order,
            },
        )
        .await?;

        let stats = HierarchyIndex::rebuild_subtree(conn, id, &old_chain, &new_chain).await?;
        tracing::debug!(
            category_id = id,
            subtree_size = stats.subtree_size,
            rows_removed = stats.rows_removed,
            rows_inserted = stats.rows_inserted,
            "Rebuilt closure rows for moved subtree"
        );

        CategoryStore::compact_sort_orders(conn, old_parent_id).await?;

        Ok(MoveOutcome {
            category: fetch(conn, id).await?,
            old_parent_id,
            affected_ids,
        })
    }

    /// Delete `id`; with `cascade` its whole subtree goes too
    ///
    /// Returns the deleted ids, deepest first. Remaining siblings are
    /// compacted.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category does not exist
    /// - `HasChildren` if it has children and `cascade` is false
    pub async fn delete_category(
        &self,
        id: CategoryId,
        cascade: bool,
    ) -> Result<Vec<CategoryId>, CategoryServiceError> {
        self.delete_inner(id, cascade, None).await
    }

    /// `delete_category` guarded by an optimistic version check
    pub async fn delete_category_checked(
        &self,
        id: CategoryId,
        cascade: bool,
        expected_version: i64,
    ) -> Result<Vec<CategoryId>, CategoryServiceError> {
        self.delete_inner(id, cascade, Some(expected_version)).await
    }

    async fn delete_inner(
        &self,
        id: CategoryId,
        cascade: bool,
        expected_version: Option<i64>,
    ) -> Result<Vec<CategoryId>, CategoryServiceError> {
        let span = operation_span("delete_category");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self.delete_in_tx(&tx, id, cascade, expected_version).await;
            let (deleted, parent_id) = Self::finish(tx, result).await?;

            tracing::info!(
                category_id = id,
                cascade,
                deleted = deleted.len(),
                "Deleted category"
            );
            self.emit_event(CategoryEvent::Deleted {
                ids: deleted.clone(),
                parent_id,
                source_client_id: self.client_id.clone(),
            });
            Ok(deleted)
        }
        .instrument(span)
        .await
    }

    async fn delete_in_tx(
        &self,
        conn: &Connection,
        id: CategoryId,
        cascade: bool,
        expected_version: Option<i64>,
    ) -> Result<(Vec<CategoryId>, Option<CategoryId>), CategoryServiceError> {
        let node = fetch(conn, id).await?;
        check_version(&node, expected_version)?;

        let child_count = CategoryStore::count_children(conn, Some(id)).await?;
        if child_count > 0 && !cascade {
            return Err(CategoryServiceError::has_children(id, child_count));
        }

        let mut subtree = CategoryStore::list_subtree(conn, id, true).await?;
        if !subtree.iter().any(|c| c.id == id) {
            return Err(CategoryServiceError::hierarchy_corrupted(format!(
                "category {} has no closure self-row",
                id
            )));
        }

        // Children before parents: categories.parent_id is a foreign key
        subtree.sort_by(|a, b| b.level.cmp(&a.level).then(b.id.cmp(&a.id)));
        let ids: Vec<CategoryId> = subtree.iter().map(|c| c.id).collect();

        HierarchyIndex::remove_nodes(conn, &ids).await?;
        for category_id in &ids {
            CategoryStore::delete(conn, *category_id).await?;
        }

        CategoryStore::compact_sort_orders(conn, node.parent_id).await?;

        Ok((ids, node.parent_id))
    }

    /// Assign `sort_order = index` to each child of `parent_id`
    ///
    /// `ordered_ids` must contain every current child exactly once. Returns
    /// the children in their new order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `parent_id` does not exist
    /// - `InvalidArgument` if `ordered_ids` is not exactly the child set
    pub async fn reorder_siblings(
        &self,
        parent_id: Option<CategoryId>,
        ordered_ids: &[CategoryId],
    ) -> Result<Vec<Category>, CategoryServiceError> {
        let span = operation_span("reorder_siblings");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self.reorder_in_tx(&tx, parent_id, ordered_ids).await;
            let children = Self::finish(tx, result).await?;

            tracing::info!(
                parent_id = ?parent_id,
                children = children.len(),
                "Reordered siblings"
            );
            self.emit_event(CategoryEvent::Reordered {
                parent_id,
                ordered_ids: ordered_ids.to_vec(),
                source_client_id: self.client_id.clone(),
            });
            Ok(children)
        }
        .instrument(span)
        .await
    }

    async fn reorder_in_tx(
        &self,
        conn: &Connection,
        parent_id: Option<CategoryId>,
        ordered_ids: &[CategoryId],
    ) -> Result<Vec<Category>, CategoryServiceError> {
        fetch_parent(conn, parent_id).await?;

        let children = CategoryStore::list_children(conn, parent_id).await?;

        let requested: HashSet<CategoryId> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() {
            return Err(CategoryServiceError::invalid_argument(
                "ordered ids contain duplicates",
            ));
        }

        let current: HashMap<CategoryId, i64> =
            children.iter().map(|c| (c.id, c.sort_order)).collect();
        let current_ids: HashSet<CategoryId> = current.keys().copied().collect();
        if requested != current_ids {
            let missing: BTreeSet<_> = current_ids.difference(&requested).collect();
            let unknown: BTreeSet<_> = requested.difference(&current_ids).collect();
            return Err(CategoryServiceError::invalid_argument(format!(
                "ordered ids do not match children of {:?}: missing {:?}, not children {:?}",
                parent_id, missing, unknown
            )));
        }

        for (index, child_id) in ordered_ids.iter().enumerate() {
            let sort_order = index as i64;
            if current.get(child_id) != Some(&sort_order) {
                CategoryStore::set_sort_order(conn, *child_id, sort_order).await?;
            }
        }

        Ok(CategoryStore::list_children(conn, parent_id).await?)
    }

    /// Change name, description and flags of a category
    ///
    /// An empty update returns the stored category without writing.
    pub async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, CategoryServiceError> {
        let span = operation_span("update_category");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self.update_in_tx(&tx, id, &update).await;
            let category = Self::finish(tx, result).await?;

            if !update.is_empty() {
                tracing::info!(category_id = id, "Updated category");
                self.emit_event(CategoryEvent::Updated {
                    category: category.clone(),
                    source_client_id: self.client_id.clone(),
                });
            }
            Ok(category)
        }
        .instrument(span)
        .await
    }

    async fn update_in_tx(
        &self,
        conn: &Connection,
        id: CategoryId,
        update: &CategoryUpdate,
    ) -> Result<Category, CategoryServiceError> {
        let current = fetch(conn, id).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let name = match &update.name {
            Some(name) => validate_category_name(name)?,
            None => current.name.clone(),
        };
        let description = match &update.description {
            Some(description) => description.clone(),
            None => current.description.clone(),
        };

        CategoryStore::update_details(
            conn,
            DbDetailsParams {
                id,
                name: &name,
                description: description.as_deref(),
                is_active: update.is_active.unwrap_or(current.is_active),
                allow_questions: update.allow_questions.unwrap_or(current.allow_questions),
            },
        )
        .await?;

        fetch(conn, id).await
    }

    /// Recompute every level and path from `parent_id` chains, regenerate
    /// the closure table and compact every sibling group
    ///
    /// Returns the number of categories indexed.
    ///
    /// # Errors
    ///
    /// - `Cycle` if the `parent_id` links themselves form a cycle
    /// - `DepthExceeded` if a chain is deeper than the ceiling
    pub async fn rebuild_index(&self) -> Result<usize, CategoryServiceError> {
        let span = operation_span("rebuild_index");
        async move {
            let (_guard, tx) = self.begin_write().await?;
            let result = self.rebuild_in_tx(&tx).await;
            let category_count = Self::finish(tx, result).await?;

            tracing::info!(category_count, "Rebuilt category hierarchy index");
            self.emit_event(CategoryEvent::IndexRebuilt {
                category_count,
                source_client_id: self.client_id.clone(),
            });
            Ok(category_count)
        }
        .instrument(span)
        .await
    }

    async fn rebuild_in_tx(&self, conn: &Connection) -> Result<usize, CategoryServiceError> {
        let categories = CategoryStore::list_all(conn).await?;
        let parents: HashMap<CategoryId, Option<CategoryId>> =
            categories.iter().map(|c| (c.id, c.parent_id)).collect();

        let mut chains = Vec::with_capacity(categories.len());
        let mut repaired = 0usize;

        for category in &categories {
            let chain = self.walk_parent_chain(category.id, &parents)?;
            let level = chain.len() as i64 + 1;
            let tree_path = PathCalculator::path_from_chain(&chain);

            if category.level != level || category.tree_path != tree_path {
                tracing::warn!(
                    category_id = category.id,
                    stored_level = category.level,
                    stored_path = %category.tree_path,
                    level,
                    path = %tree_path,
                    "Repairing category level and path"
                );
                CategoryStore::update_level_and_path(conn, category.id, level, &tree_path)
                    .await?;
                repaired += 1;
            }

            chains.push((category.id, chain));
        }

        let rows = HierarchyIndex::rebuild_all(conn, &chains).await?;

        let sibling_groups: BTreeSet<Option<CategoryId>> =
            std::iter::once(None).chain(parents.values().copied()).collect();
        let mut renumbered = 0;
        for parent_id in sibling_groups {
            renumbered += CategoryStore::compact_sort_orders(conn, parent_id).await?;
        }

        tracing::debug!(rows, repaired, renumbered, "Hierarchy index regenerated");

        Ok(categories.len())
    }

    /// Ancestors of `id` following `parent_id` links, root first
    fn walk_parent_chain(
        &self,
        id: CategoryId,
        parents: &HashMap<CategoryId, Option<CategoryId>>,
    ) -> Result<Vec<CategoryId>, CategoryServiceError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = parents.get(&id).copied().flatten();

        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                return Err(CategoryServiceError::cycle(id, parent_id));
            }
            chain.push(parent_id);
            current = match parents.get(&parent_id) {
                Some(next) => *next,
                None => {
                    return Err(CategoryServiceError::hierarchy_corrupted(format!(
                        "category {} references missing parent {}",
                        id, parent_id
                    )))
                }
            };
        }

        chain.reverse();
        DepthValidator::validate_level(chain.len() as i64 + 1, self.max_depth)?;
        Ok(chain)
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "tree_mutator_test.rs"]
mod tree_mutator_test;
