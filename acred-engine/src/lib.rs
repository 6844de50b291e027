//! acred-engine library - dataset ingestion and accreditation consolidation
//!
//! Turns tabular uploads into validated SQLite tables, merges incremental
//! uploads, and assembles per-subject profiles filtered by accreditation
//! rule sets. Adapters (the CLI binary, or any other front end) call the
//! free functions in each module with a shared `EngineState`.

use acred_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod artifacts;
pub mod cache;
pub mod consolidate;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod pagination;
pub mod reader;
pub mod registry;
pub mod rules;
pub mod sanitize;
pub mod store;

pub use error::{EngineError, Result};

use cache::ResultCache;
use registry::SchemaRegistry;
use rules::RuleBook;
use store::TableLocks;

/// Engine state shared by every operation
#[derive(Clone, Debug)]
pub struct EngineState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Dataset declarations
    pub registry: Arc<SchemaRegistry>,
    /// Accreditation rule sets
    pub rules: Arc<RuleBook>,
    /// Profile/summary cache, invalidated by every write
    pub cache: Arc<ResultCache>,
    /// Per-table writer locks
    pub locks: TableLocks,
    /// Upper bound for summary page sizes
    pub summary_page_cap: i64,
}

impl EngineState {
    /// Create state from already-built parts
    pub fn new(
        db: SqlitePool,
        registry: SchemaRegistry,
        rules: RuleBook,
        cache: ResultCache,
        summary_page_cap: i64,
    ) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            rules: Arc::new(rules),
            cache: Arc::new(cache),
            locks: TableLocks::new(),
            summary_page_cap: summary_page_cap.max(1),
        }
    }

    /// Built-in registry, configured rule sets, configured TTL and page cap
    pub fn from_config(db: SqlitePool, config: &TomlConfig) -> Result<Self> {
        Ok(Self::new(
            db,
            SchemaRegistry::builtin()?,
            RuleBook::from_config(&config.rule_sets)?,
            ResultCache::new(config.cache_ttl()),
            config.summary_page_cap(),
        ))
    }
}
