//! Relational store helpers for dataset tables
//!
//! Dataset tables are dynamic (their shape comes from the registry), so the
//! SQL here is built from sanitized identifiers rather than checked at
//! compile time. Every column is `TEXT`; empty cells are stored as `NULL`.

use acred_common::db::quote_identifier;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// SQLite's default bound-parameter limit
const MAX_BIND_PARAMS: usize = 999;

/// Open a transaction that holds the database write lock from its start
///
/// Under WAL a deferred transaction that reads before writing fails with
/// `SQLITE_BUSY` if another connection committed in between; `BEGIN
/// IMMEDIATE` waits on the busy timeout instead.
pub async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Drop and recreate `table`, then bulk insert `rows`
///
/// Runs on whatever connection it is given; callers pass an open
/// transaction so the drop and the inserts commit or roll back together.
pub async fn replace_table(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[String],
    rows: &[Vec<String>],
) -> sqlx::Result<()> {
    let quoted_table = quote_identifier(table);
    let quoted_columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted_table))
        .execute(&mut *conn)
        .await?;

    let column_defs = quoted_columns
        .iter()
        .map(|c| format!("{} TEXT", c))
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!("CREATE TABLE {} ({})", quoted_table, column_defs))
        .execute(&mut *conn)
        .await?;

    if columns.is_empty() || rows.is_empty() {
        return Ok(());
    }

    let chunk_rows = (MAX_BIND_PARAMS / columns.len()).max(1);
    let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
    let insert_prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        quoted_table,
        quoted_columns.join(", ")
    );

    for chunk in rows.chunks(chunk_rows) {
        let sql = format!(
            "{}{}",
            insert_prefix,
            vec![row_placeholder.as_str(); chunk.len()].join(", ")
        );
        let mut query = sqlx::query(&sql);
        for row in chunk {
            for cell in row {
                let value = if cell.is_empty() { None } else { Some(cell.as_str()) };
                query = query.bind(value);
            }
        }
        query.execute(&mut *conn).await?;
    }

    Ok(())
}

/// Read `columns` of every row in insertion order; `NULL` reads as ""
pub async fn read_table_rows(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[String],
) -> sqlx::Result<Vec<Vec<String>>> {
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let select_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        select_list,
        quote_identifier(table)
    );

    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(|row| decode_row(row, columns.len())).collect()
}

/// Read rows whose `column` equals `value`, in insertion order
pub async fn read_rows_matching(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[String],
    column: &str,
    value: &str,
) -> sqlx::Result<Vec<Vec<String>>> {
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let select_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM {} WHERE TRIM({}) = ? ORDER BY rowid",
        select_list,
        quote_identifier(table),
        quote_identifier(column)
    );

    let rows = sqlx::query(&sql)
        .bind(value.trim())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(|row| decode_row(row, columns.len())).collect()
}

fn decode_row(row: &SqliteRow, width: usize) -> sqlx::Result<Vec<String>> {
    (0..width)
        .map(|i| {
            row.try_get::<Option<String>, _>(i)
                .map(Option::unwrap_or_default)
        })
        .collect()
}

/// Keyed async mutexes serializing writers per canonical table
///
/// Different tables lock independently. The guard is owned so it can be
/// held across `.await` points for the whole write transaction.
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `table`
    pub async fn acquire(&self, table: &str) -> OwnedMutexGuard<()> {
        let lock = {
            // Entries are only ever inserted, so a poisoned map is still consistent
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(table.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;
    use std::time::Duration;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_replace_and_read_back() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let columns = cols(&["id", "name"]);
        let rows = vec![row(&["1", "Ana"]), row(&["2", ""])];

        replace_table(&mut conn, "subjects", &columns, &rows).await.unwrap();
        let read = read_table_rows(&mut conn, "subjects", &columns).await.unwrap();
        assert_eq!(read, rows);

        let nulls: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE name IS NULL")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[tokio::test]
    async fn test_read_rows_matching_filters_trimmed() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let columns = cols(&["id", "role"]);
        let rows = vec![row(&["1", "Analyst"]), row(&["2", "Manager"]), row(&["1 ", "Director"])];
        replace_table(&mut conn, "exp", &columns, &rows).await.unwrap();

        let matched = read_rows_matching(&mut conn, "exp", &columns, "id", "1")
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[1][1], "Director");
    }

    #[tokio::test]
    async fn test_replace_drops_previous_content() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let columns = cols(&["id"]);
        replace_table(&mut conn, "t", &columns, &[row(&["1"]), row(&["2"])])
            .await
            .unwrap();
        replace_table(&mut conn, "t", &columns, &[row(&["3"])]).await.unwrap();

        let read = read_table_rows(&mut conn, "t", &columns).await.unwrap();
        assert_eq!(read, vec![row(&["3"])]);
    }

    #[tokio::test]
    async fn test_bulk_insert_spans_chunks() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let columns = cols(&["a", "b", "c"]);
        let rows: Vec<Vec<String>> = (0..1000)
            .map(|i| vec![i.to_string(), "x".to_string(), "y".to_string()])
            .collect();

        replace_table(&mut conn, "big", &columns, &rows).await.unwrap();
        let read = read_table_rows(&mut conn, "big", &columns).await.unwrap();
        assert_eq!(read.len(), 1000);
        assert_eq!(read[999][0], "999");
    }

    #[tokio::test]
    async fn test_same_table_lock_is_exclusive() {
        let locks = TableLocks::new();
        let guard = locks.acquire("t").await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire("t").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        // Other tables are not blocked
        let _other = locks.acquire("u").await;

        drop(guard);
        waiting.await.unwrap();
    }
}
