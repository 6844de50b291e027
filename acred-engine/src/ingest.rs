//! Full-load ingestion
//!
//! Parses a source file against a dataset spec and replaces the stored
//! table in one transaction. A failed load leaves the previous table
//! content untouched.

use crate::error::{EngineError, Result};
use crate::reader::read_table;
use crate::registry::DatasetSpec;
use crate::sanitize::normalize_token;
use crate::store::{begin_write, replace_table};
use crate::EngineState;
use acred_common::db::{row_count, table_exists};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Extensions considered when discovering source files by name
const SOURCE_EXTENSIONS: [&str; 6] = ["csv", "tsv", "txt", "xlsx", "xlsm", "xls"];

/// Outcome of a successful full load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Replace the stored table for `spec` with the content of one source file
///
/// Parse and column validation complete before the table lock is taken;
/// the drop and bulk insert then run inside a single transaction.
pub async fn load_full(
    state: &EngineState,
    spec: &DatasetSpec,
    filename: &str,
    bytes: &[u8],
) -> Result<LoadReport> {
    let parsed = read_table(bytes, filename, spec.preamble_rows)?;
    spec.validate_columns(&parsed.columns)?;
    let parsed = parsed.reorder(&spec.expected_columns);

    let _guard = state.locks.acquire(&spec.canonical_name).await;
    write_table(state, &spec.canonical_name, &parsed.columns, &parsed.rows).await?;
    state.cache.invalidate_all();

    info!(
        table = %spec.canonical_name,
        rows = parsed.rows.len(),
        source = filename,
        "Full load complete"
    );

    Ok(LoadReport {
        table: spec.canonical_name.clone(),
        row_count: parsed.rows.len(),
        columns: parsed.columns,
    })
}

/// Drop/create/insert in one transaction, rolled back on any failure
pub(crate) async fn write_table(
    state: &EngineState,
    table: &str,
    columns: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    let fail = |source: sqlx::Error| {
        error!(table = table, error = %source, "Write failed, rolling back");
        EngineError::TransactionFailure {
            table: table.to_string(),
            source,
        }
    };

    let mut tx = begin_write(&state.db).await.map_err(fail)?;
    // Dropping `tx` without commit rolls back
    replace_table(&mut *tx, table, columns, rows)
        .await
        .map_err(fail)?;
    tx.commit().await.map_err(fail)?;
    Ok(())
}

/// Locate the source file for `spec` inside `data_dir`
///
/// The configured file name wins; otherwise any supported file whose stem
/// matches it ignoring case and punctuation (`Base de Dados Docente.xlsx`
/// for `base-de-dados-docente.csv`).
pub fn resolve_dataset_file(data_dir: &Path, spec: &DatasetSpec) -> Result<Option<PathBuf>> {
    let configured = data_dir.join(&spec.source_file);
    if configured.is_file() {
        return Ok(Some(configured));
    }
    if !data_dir.is_dir() {
        return Ok(None);
    }

    let target = resource_key(&spec.source_file);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.as_str()))
        })
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| resource_key(&name.to_string_lossy()) == target)
        })
        .collect();

    // Directory order is unspecified
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Stem reduced to lowercase alphanumerics
fn resource_key(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize_token(&stem).replace('_', "")
}

/// Per-dataset result of a bootstrap run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapStatus {
    Loaded { source: PathBuf, rows: usize },
    /// Table already holds rows and `force` was not set
    Skipped { rows: i64 },
    /// No source file found
    Missing,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapOutcome {
    pub table: String,
    #[serde(flatten)]
    pub status: BootstrapStatus,
}

/// Full-load every registered dataset whose source file is in `data_dir`
///
/// One dataset failing does not stop the others; its outcome is `Failed`.
pub async fn bootstrap_from_dir(
    state: &EngineState,
    data_dir: &Path,
    force: bool,
) -> Result<Vec<BootstrapOutcome>> {
    let mut outcomes = Vec::new();

    for spec in state.registry.specs() {
        let status = bootstrap_dataset(state, spec, data_dir, force)
            .await
            .unwrap_or_else(|e| {
                error!(table = %spec.canonical_name, error = %e, "Bootstrap check failed");
                BootstrapStatus::Failed {
                    error: e.to_string(),
                }
            });

        outcomes.push(BootstrapOutcome {
            table: spec.canonical_name.clone(),
            status,
        });
    }

    Ok(outcomes)
}

async fn bootstrap_dataset(
    state: &EngineState,
    spec: &DatasetSpec,
    data_dir: &Path,
    force: bool,
) -> Result<BootstrapStatus> {
    let Some(path) = resolve_dataset_file(data_dir, spec)? else {
        warn!(table = %spec.canonical_name, dir = %data_dir.display(), "No source file found");
        return Ok(BootstrapStatus::Missing);
    };

    let existing = existing_rows(state, &spec.canonical_name).await?;
    if !force && existing > 0 {
        info!(table = %spec.canonical_name, rows = existing, "Table already loaded, skipping");
        return Ok(BootstrapStatus::Skipped { rows: existing });
    }
    Ok(load_file(state, spec, &path).await)
}

async fn load_file(state: &EngineState, spec: &DatasetSpec, path: &Path) -> BootstrapStatus {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = match tokio::fs::read(path).await {
        Ok(bytes) => load_full(state, spec, &filename, &bytes).await,
        Err(e) => Err(EngineError::Io(e)),
    };

    match result {
        Ok(report) => BootstrapStatus::Loaded {
            source: path.to_path_buf(),
            rows: report.row_count,
        },
        Err(e) => {
            error!(table = %spec.canonical_name, source = %path.display(), error = %e, "Bootstrap load failed");
            BootstrapStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

async fn existing_rows(state: &EngineState, table: &str) -> Result<i64> {
    let mut conn = state.db.acquire().await?;
    if !table_exists(&mut *conn, table).await? {
        return Ok(0);
    }
    Ok(row_count(&mut *conn, table).await?)
}
