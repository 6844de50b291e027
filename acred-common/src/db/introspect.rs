//! Schema introspection
//!
//! Reads the actual shape of stored tables so callers can compare it with
//! the declared dataset schemas. All helpers take a connection so they can
//! run inside an open transaction.

use crate::Result;
use sqlx::SqliteConnection;

/// Quote an identifier for interpolation into SQL text
///
/// Dataset identifiers are sanitized before they get here; quoting still
/// escapes embedded quotes so a hostile name cannot break out.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Check if table exists
pub async fn table_exists(conn: &mut SqliteConnection, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type = 'table' AND name = ?
        )
        "#,
    )
    .bind(table_name)
    .fetch_one(conn)
    .await?;

    Ok(exists)
}

/// Column names of a table in declaration order (empty if the table is absent)
pub async fn table_columns(conn: &mut SqliteConnection, table_name: &str) -> Result<Vec<String>> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table_name)
            .fetch_all(conn)
            .await?;

    Ok(columns)
}

/// Number of rows in a table
pub async fn row_count(conn: &mut SqliteConnection, table_name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(conn).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn setup_test_conn() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_table_exists() {
        let mut conn = setup_test_conn().await;
        assert!(!table_exists(&mut conn, "subjects").await.unwrap());

        sqlx::query("CREATE TABLE subjects (id TEXT, name TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();

        assert!(table_exists(&mut conn, "subjects").await.unwrap());
    }

    #[tokio::test]
    async fn test_table_columns_in_declaration_order() {
        let mut conn = setup_test_conn().await;
        sqlx::query("CREATE TABLE subjects (id TEXT, name TEXT, area TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();

        let columns = table_columns(&mut conn, "subjects").await.unwrap();
        assert_eq!(columns, vec!["id", "name", "area"]);

        let missing = table_columns(&mut conn, "nothing_here").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_row_count() {
        let mut conn = setup_test_conn().await;
        sqlx::query("CREATE TABLE subjects (id TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO subjects (id) VALUES ('1'), ('2')")
            .execute(&mut conn)
            .await
            .unwrap();

        assert_eq!(row_count(&mut conn, "subjects").await.unwrap(), 2);
    }
}
