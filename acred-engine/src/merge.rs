//! Upload merge engine
//!
//! Incremental path: an uploaded file is validated against the registry
//! (and the stored table), then merged into the existing rows. Matching
//! rows are replaced, new rows appended, rows absent from the upload are
//! left as they were. Read, merge and write-back share one transaction.

use crate::error::{EngineError, Result};
use crate::reader::read_table;
use crate::registry::DatasetSpec;
use crate::store::{begin_write, read_table_rows, replace_table};
use crate::EngineState;
use acred_common::db::{table_columns, table_exists};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info};

/// Counts reported after a successful merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub table: String,
    /// Upload rows with no matching stored row
    pub inserted: usize,
    /// Matched rows whose content changed
    pub updated: usize,
    /// Matched rows with identical content
    pub unchanged: usize,
    /// Upload rows superseded by a later row with the same key
    pub duplicates_in_upload: usize,
    pub total_rows: usize,
    pub columns: Vec<String>,
}

/// Result of merging two row sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rows: Vec<Vec<String>>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates_in_upload: usize,
}

/// Merge an uploaded file into the table resolved from `table_key`
pub async fn merge_upload(
    state: &EngineState,
    table_key: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<MergeReport> {
    let spec = state.registry.resolve(table_key)?;
    let table = spec.canonical_name.as_str();

    // Validate everything about the upload before touching the store
    let parsed = read_table(bytes, filename, spec.preamble_rows)?;
    spec.validate_columns(&parsed.columns)?;
    let parsed = parsed.reorder(&spec.expected_columns);

    let _guard = state.locks.acquire(table).await;

    let fail = |source: sqlx::Error| {
        error!(table = table, error = %source, "Merge failed, rolling back");
        EngineError::TransactionFailure {
            table: table.to_string(),
            source,
        }
    };

    let mut tx = begin_write(&state.db).await.map_err(fail)?;

    let existing = if table_exists(&mut *tx, table).await? {
        let stored_columns = table_columns(&mut *tx, table).await?;
        spec.validate_columns(&stored_columns)?;
        read_table_rows(&mut *tx, table, &spec.expected_columns)
            .await
            .map_err(fail)?
    } else {
        Vec::new()
    };

    let outcome = merge_rows(&spec, existing, parsed.rows);

    replace_table(&mut *tx, table, &spec.expected_columns, &outcome.rows)
        .await
        .map_err(fail)?;
    tx.commit().await.map_err(fail)?;
    state.cache.invalidate_all();

    info!(
        table = table,
        inserted = outcome.inserted,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        total = outcome.rows.len(),
        "Upload merged"
    );

    Ok(MergeReport {
        table: table.to_string(),
        inserted: outcome.inserted,
        updated: outcome.updated,
        unchanged: outcome.unchanged,
        duplicates_in_upload: outcome.duplicates_in_upload,
        total_rows: outcome.rows.len(),
        columns: spec.expected_columns.clone(),
    })
}

/// Merge `incoming` into `existing`; both in `spec.expected_columns` order
///
/// Rows match on `spec.key_columns`, or on the whole row when no key is
/// declared. Within the upload the last row for a key wins. A matched
/// stored row is replaced in place; unmatched upload rows are appended in
/// upload order. Stored rows sharing a matched key collapse into one.
pub fn merge_rows(
    spec: &DatasetSpec,
    existing: Vec<Vec<String>>,
    incoming: Vec<Vec<String>>,
) -> MergeOutcome {
    let key_positions: Vec<usize> = spec
        .key_columns
        .iter()
        .filter_map(|key| spec.expected_columns.iter().position(|c| c == key))
        .collect();
    let key_of = |row: &[String]| -> Vec<String> {
        if key_positions.is_empty() {
            row.to_vec()
        } else {
            key_positions
                .iter()
                .map(|i| row.get(*i).map(|v| v.trim().to_string()).unwrap_or_default())
                .collect()
        }
    };

    // Last-wins dedup inside the upload, keeping first-appearance order
    let mut upload: Vec<(Vec<String>, Vec<String>, bool)> = Vec::new();
    let mut upload_index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut duplicates_in_upload = 0;
    for row in incoming {
        let key = key_of(&row);
        match upload_index.get(&key) {
            Some(&i) => {
                upload[i].1 = row;
                duplicates_in_upload += 1;
            }
            None => {
                upload_index.insert(key.clone(), upload.len());
                upload.push((key, row, false));
            }
        }
    }

    let mut rows = Vec::with_capacity(existing.len() + upload.len());
    let (mut updated, mut unchanged) = (0, 0);
    for row in existing {
        let Some(&i) = upload_index.get(&key_of(&row)) else {
            rows.push(row);
            continue;
        };
        let (_, replacement, applied) = &mut upload[i];
        if *applied {
            continue;
        }
        *applied = true;
        if *replacement == row {
            unchanged += 1;
        } else {
            updated += 1;
        }
        rows.push(replacement.clone());
    }

    let mut inserted = 0;
    for (_, row, applied) in upload {
        if !applied {
            inserted += 1;
            rows.push(row);
        }
    }

    MergeOutcome {
        rows,
        inserted,
        updated,
        unchanged,
        duplicates_in_upload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(key: &[&str]) -> DatasetSpec {
        DatasetSpec::new("t", "t.csv", &["id", "name", "area"]).with_key(key)
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_keyed_upsert() {
        let existing = vec![row(&["1", "Ana", "FIN"]), row(&["2", "Rui", "MGT"])];
        let incoming = vec![row(&["2", "Rui", "ECO"]), row(&["3", "Eva", "MKT"])];

        let outcome = merge_rows(&spec(&["id"]), existing, incoming);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.unchanged, 0);
        assert_eq!(
            outcome.rows,
            vec![
                row(&["1", "Ana", "FIN"]),
                row(&["2", "Rui", "ECO"]),
                row(&["3", "Eva", "MKT"]),
            ]
        );
    }

    #[test]
    fn test_last_row_in_upload_wins() {
        let incoming = vec![
            row(&["1", "Ana", "FIN"]),
            row(&["1", "Ana", "ACC"]),
        ];
        let outcome = merge_rows(&spec(&["id"]), vec![], incoming);
        assert_eq!(outcome.duplicates_in_upload, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.rows, vec![row(&["1", "Ana", "ACC"])]);
    }

    #[test]
    fn test_full_row_match_without_key() {
        let existing = vec![row(&["1", "Ana", "FIN"])];
        let incoming = vec![row(&["1", "Ana", "FIN"]), row(&["1", "Ana", "ACC"])];

        let outcome = merge_rows(&spec(&[]), existing, incoming);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.rows.len(), 2);
    }

    #[test]
    fn test_existing_duplicates_collapse_only_when_matched() {
        let existing = vec![
            row(&["1", "Ana", "FIN"]),
            row(&["1", "Ana", "FIN"]),
            row(&["2", "Rui", "MGT"]),
            row(&["2", "Rui", "MGT"]),
        ];
        let incoming = vec![row(&["1", "Ana", "FIN"])];

        let outcome = merge_rows(&spec(&["id"]), existing, incoming);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(
            outcome.rows,
            vec![
                row(&["1", "Ana", "FIN"]),
                row(&["2", "Rui", "MGT"]),
                row(&["2", "Rui", "MGT"]),
            ]
        );
    }

    #[test]
    fn test_key_match_ignores_surrounding_whitespace() {
        let existing = vec![row(&["7", "Ana", "FIN"])];
        let incoming = vec![row(&[" 7 ", "Ana", "ECO"])];
        let outcome = merge_rows(&spec(&["id"]), existing, incoming);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.rows.len(), 1);
    }
}
