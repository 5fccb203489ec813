//! Category Hierarchy Audit Binary
//!
//! Opens the category database, checks every hierarchy invariant and prints
//! the report as JSON. Exits with status 1 when issues are found.
//!
//! # Usage
//!
//! ```bash
//! # Audit the default database (~/.qbank/database/categories.db)
//! cargo run --bin category-audit
//!
//! # Regenerate paths, levels and the closure table first, then audit
//! cargo run --bin category-audit -- --repair
//!
//! # Also print the materialized forest
//! cargo run --bin category-audit -- --tree
//!
//! # Audit a specific database file
//! cargo run --bin category-audit -- --db ./categories.db
//! ```
//!
//! # Environment Variables
//!
//! - `QBANK_DATABASE_PATH`: Database file
//! - `QBANK_MAX_DEPTH`: Level ceiling used by the audit and repair
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use qbank_core::{CategoryEngine, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "category-audit")]
#[command(version, about = "Audit and repair the category hierarchy", long_about = None)]
struct AuditArgs {
    /// Regenerate paths, levels and the closure table before auditing
    #[arg(long)]
    repair: bool,

    /// Also print the materialized forest as JSON
    #[arg(long)]
    tree: bool,

    /// Database file (overrides QBANK_DATABASE_PATH)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = AuditArgs::parse();

    let mut config = EngineConfig::from_env().map_err(anyhow::Error::msg)?;
    if let Some(path) = args.db {
        config.database_path = path;
    }
    tracing::info!("Database: {}", config.database_path.display());

    let engine = CategoryEngine::open(config).await?;

    if args.repair {
        let count = engine.mutator().with_client("category-audit").rebuild_index().await?;
        tracing::info!("Rebuilt hierarchy index for {} categories", count);
    }

    let report = engine.check_integrity().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.tree {
        let forest = engine.queries().materialize_tree(None).await?;
        println!("{}", serde_json::to_string_pretty(&forest)?);
    }

    if report.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!("{} integrity issue(s) found", report.issues.len());
        Ok(ExitCode::from(1))
    }
}
