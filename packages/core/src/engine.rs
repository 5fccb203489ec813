//! CategoryEngine - one handle wiring database, writer, reader and auditor
//!
//! # Examples
//!
//! ```no_run
//! use qbank_core::{CategoryEngine, CategoryType, EngineConfig, NewCategory};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = CategoryEngine::open(EngineConfig::from_env().map_err(anyhow::Error::msg)?).await?;
//!
//! let math = engine
//!     .mutator()
//!     .create_category(NewCategory::new("Mathematics", "MATH", CategoryType::Subject))
//!     .await?;
//! let ancestors = engine.queries().get_ancestors(math.id).await?;
//! assert!(ancestors.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::db::DatabaseService;
use crate::services::{
    CategoryQueryService, CategoryServiceError, IntegrityChecker, IntegrityReport, TreeMutator,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct CategoryEngine {
    config: EngineConfig,
    db: Arc<DatabaseService>,
    mutator: TreeMutator,
    queries: CategoryQueryService,
}

impl CategoryEngine {
    /// Validate `config`, open the database and build the services
    pub async fn open(config: EngineConfig) -> Result<Self, CategoryServiceError> {
        config
            .validate()
            .map_err(CategoryServiceError::invalid_argument)?;

        let db = Arc::new(DatabaseService::open(&config).await?);
        let mutator = TreeMutator::new(db.clone(), &config);
        let queries = CategoryQueryService::new(db.clone());

        tracing::info!(
            path = %config.database_path.display(),
            max_depth = config.max_depth,
            "Category engine opened"
        );

        Ok(Self {
            config,
            db,
            mutator,
            queries,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    pub fn mutator(&self) -> &TreeMutator {
        &self.mutator
    }

    pub fn queries(&self) -> &CategoryQueryService {
        &self.queries
    }

    /// Run a full integrity audit
    pub async fn check_integrity(&self) -> Result<IntegrityReport, CategoryServiceError> {
        IntegrityChecker::new(self.db.clone(), self.config.max_depth)
            .check()
            .await
    }
}
