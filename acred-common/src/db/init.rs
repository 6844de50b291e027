//! Database initialization
//!
//! Opens (creating on first run) the SQLite store and makes sure the
//! engine-owned tables exist. Dataset tables are not created here; they are
//! materialized by the ingestion paths from uploaded files.

use crate::config::DatabaseLocation;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Table holding generated-artifact metadata (separate from subject data)
pub const ARTIFACT_TABLE: &str = "artifact_records";

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the store described by a resolved configuration
pub async fn open_database(location: &DatabaseLocation) -> Result<SqlitePool> {
    match location {
        DatabaseLocation::File(path) => init_database(path).await,
        DatabaseLocation::Url(url) => connect(url).await,
    }
}

/// Initialize database file and create engine tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = connection_options(SqliteConnectOptions::new().filename(db_path))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    prepare_pool(&pool).await?;
    Ok(pool)
}

/// Connect to an explicit SQLite URL and create engine tables if needed
///
/// In-memory URLs get a single connection; every connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let max_connections = if url.contains(":memory:") { 1 } else { 10 };
    let options = connection_options(SqliteConnectOptions::from_str(url)?);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    info!("Connected to database: {}", url);

    prepare_pool(&pool).await?;
    Ok(pool)
}

/// Pragmas every connection in the pool must carry
///
/// WAL lets readers proceed while one writer replaces a table; the busy
/// timeout makes competing writers queue instead of failing.
fn connection_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
}

async fn prepare_pool(pool: &SqlitePool) -> Result<()> {
    create_artifact_records_table(pool).await?;
    Ok(())
}

async fn create_artifact_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifact_records (
            guid TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            accreditation_id TEXT NOT NULL,
            path TEXT NOT NULL,
            generated_at TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artifact_records_accreditation ON artifact_records(accreditation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
