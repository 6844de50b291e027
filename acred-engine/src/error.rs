//! Error types for the accreditation engine
//!
//! Every operation exposed to adapters returns one of these variants; none
//! of them panic across the library boundary.

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Table key or alias does not resolve to a registered dataset
    #[error("Unknown table '{key}'. Use one of: {}", valid.join(", "))]
    SchemaNotFound { key: String, valid: Vec<String> },

    /// Header set differs from the expected set after sanitization
    #[error(
        "Invalid columns for table {table} (missing: [{}]; unexpected: [{}])",
        missing.join(", "),
        unexpected.join(", ")
    )]
    ColumnMismatch {
        table: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Malformed source file; `row` is the 1-based data row when known
    #[error("Parse error{}: {message}", row.map(|r| format!(" at row {}", r)).unwrap_or_default())]
    Parse { row: Option<usize>, message: String },

    /// Store-level failure while writing; the transaction was rolled back
    #[error("Transaction failed on table {table}: {source}")]
    TransactionFailure {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Accreditation id without a registered rule set
    #[error("Unknown rule set: {0}")]
    UnknownRuleSet(String),

    /// Rule set rejected at registration
    #[error("Invalid rule set {id}: {reason}")]
    InvalidRuleSet { id: String, reason: String },

    /// Two datasets claim the same name or alias (startup invariant)
    #[error("Alias '{alias}' is claimed by both {first} and {second}")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    /// Subject id absent from the subject table
    #[error("Subject not found: {0}")]
    NotFound(String),

    /// Consolidation needs a table that was never loaded
    #[error("Table not loaded: {0}")]
    TableNotLoaded(String),

    /// Read-path database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared-library error
    #[error(transparent)]
    Common(#[from] acred_common::Error),
}

impl EngineError {
    /// Parse error without a row position
    pub fn parse(message: impl Into<String>) -> Self {
        EngineError::Parse {
            row: None,
            message: message.into(),
        }
    }

    /// Parse error pinned to a 1-based data row
    pub fn parse_at(row: usize, message: impl Into<String>) -> Self {
        EngineError::Parse {
            row: Some(row),
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_mismatch_message_lists_both_sides() {
        let err = EngineError::ColumnMismatch {
            table: "subjects".to_string(),
            missing: vec!["name".to_string()],
            unexpected: vec!["other".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid columns for table subjects (missing: [name]; unexpected: [other])"
        );
    }

    #[test]
    fn test_parse_error_row_position() {
        assert_eq!(
            EngineError::parse_at(3, "too many cells").to_string(),
            "Parse error at row 3: too many cells"
        );
        assert_eq!(EngineError::parse("empty file").to_string(), "Parse error: empty file");
    }
}
