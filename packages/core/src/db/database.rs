//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the category hierarchy, using libsql's embedded SQLite engine.
//!
//! # Architecture
//!
//! - **Two tables**: `categories` (node records) and `category_hierarchy`
//!   (closure table, one row per ancestor/descendant pair plus self-rows)
//! - **WAL mode**: Write-Ahead Logging so readers do not block the writer
//! - **Foreign keys**: Enabled on every connection; closure rows reference
//!   categories without cascade, so a forgotten row fails the delete
//! - **CHECK constraints**: level ceiling and the root/level rule are
//!   enforced by SQLite as a last line behind the engine's own validation
//!
//! # Connection Patterns
//!
//! Use `connect_with_timeout()` in async code. It applies the configured busy
//! timeout and foreign key enforcement, both of which are per-connection
//! settings in SQLite.
//!
//! Writers open their transaction through `begin_immediate()` so that the
//! SQLite write lock is taken before the first read of the transaction.

use crate::config::EngineConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database, Transaction, TransactionBehavior};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql handle and schema
///
/// # Examples
///
/// ```no_run
/// use qbank_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_service = DatabaseService::new(PathBuf::from("./data/categories.db")).await?;
///     let conn = db_service.connect_with_timeout().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with default settings
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::open(&EngineConfig::with_database_path(db_path)).await
    }

    /// Open (or create) the database described by `config`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created, the
    /// connection fails, or schema initialization fails.
    pub async fn open(config: &EngineConfig) -> Result<Self, DatabaseError> {
        let db_path = config.database_path.clone();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema().await?;

        tracing::debug!(path = %service.db_path.display(), "Category database ready");

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call on every open.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                category_type TEXT NOT NULL,
                level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 6),
                parent_id INTEGER REFERENCES categories(id),
                sort_order INTEGER NOT NULL DEFAULT 0,
                tree_path TEXT NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                allow_questions INTEGER NOT NULL DEFAULT 1,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                modified_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK ((parent_id IS NULL) = (level = 1))
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create categories table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS category_hierarchy (
                ancestor_id INTEGER NOT NULL REFERENCES categories(id),
                descendant_id INTEGER NOT NULL REFERENCES categories(id),
                depth INTEGER NOT NULL CHECK (depth >= 0),
                path TEXT NOT NULL,
                is_direct INTEGER NOT NULL,
                PRIMARY KEY (ancestor_id, descendant_id),
                CHECK ((ancestor_id = descendant_id) = (depth = 0)),
                CHECK (is_direct = (depth = 1))
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create category_hierarchy table: {}",
                e
            ))
        })?;

        self.create_indexes(&conn).await?;

        Ok(())
    }

    /// Create indexes for sibling listing and reverse closure lookups
    async fn create_indexes(&self, conn: &Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_categories_parent",
                "CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id, sort_order)",
            ),
            (
                "idx_categories_tree_path",
                "CREATE INDEX IF NOT EXISTS idx_categories_tree_path ON categories(tree_path)",
            ),
            (
                "idx_hierarchy_descendant",
                "CREATE INDEX IF NOT EXISTS idx_hierarchy_descendant ON category_hierarchy(descendant_id, depth)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// Prefer `connect_with_timeout()`; a raw handle has neither the busy
    /// timeout nor foreign key enforcement applied.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(self.db_path.clone(), e))
    }

    /// Get a connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;

        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Begin a write transaction that holds the SQLite write lock from the start
    pub async fn begin_immediate(conn: &Connection) -> Result<Transaction, DatabaseError> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to begin write transaction: {}", e))
            })
    }
}
