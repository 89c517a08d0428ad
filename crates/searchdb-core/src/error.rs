//! Error types for the search database.
//!
//! Every fallible operation returns [`SearchDbError`]. Transient busy
//! conditions are absorbed by the retry policy and only show up here when an
//! attempt cap is configured and exhausted.

use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the search database.
#[derive(Debug, Error)]
pub enum SearchDbError {
    // Storage errors
    #[error("Failed to open search database at {path}: {message}")]
    Open {
        message: String,
        path: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Schema error: {message}")]
    Schema {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Statement error: {message}")]
    Statement {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Search database not found: {name}")]
    DatabaseNotFound { name: String },
}

/// Result type alias for search database operations.
pub type Result<T> = std::result::Result<T, SearchDbError>;

impl From<rusqlite::Error> for SearchDbError {
    fn from(err: rusqlite::Error) -> Self {
        SearchDbError::Statement {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for SearchDbError {
    fn from(err: std::io::Error) -> Self {
        SearchDbError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SearchDbError {
    fn from(err: serde_json::Error) -> Self {
        SearchDbError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SearchDbError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SearchDbError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub(crate) fn schema(context: &str, err: rusqlite::Error) -> Self {
        SearchDbError::Schema {
            message: format!("{}: {}", context, err),
            source: Some(err),
        }
    }

    pub(crate) fn transaction(context: &str, err: rusqlite::Error) -> Self {
        SearchDbError::Transaction {
            message: format!("{}: {}", context, err),
            source: Some(err),
        }
    }

    pub(crate) fn close(location: &str, err: rusqlite::Error) -> Self {
        SearchDbError::Statement {
            message: format!("Failed to close search database at {}: {}", location, err),
            source: Some(err),
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        SearchDbError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error wraps a transient busy/locked status from SQLite.
    pub fn is_busy(&self) -> bool {
        match self {
            SearchDbError::Open { source, .. }
            | SearchDbError::Schema { source, .. }
            | SearchDbError::Transaction { source, .. }
            | SearchDbError::Statement { source, .. } => {
                source.as_ref().is_some_and(is_busy_error)
            }
            _ => false,
        }
    }
}

/// Whether a raw SQLite error is the retryable busy/locked status.
pub fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        )
    }

    #[test]
    fn test_error_display() {
        let err = SearchDbError::Validation {
            field: "module_id".into(),
            message: "must not be empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "Validation error for module_id: must not be empty"
        );
    }

    #[test]
    fn test_rusqlite_maps_to_statement() {
        let err: SearchDbError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, SearchDbError::Statement { .. }));
    }

    #[test]
    fn test_close_failure_is_statement_error() {
        let err = SearchDbError::close("/tmp/search.sqlite", busy());
        assert!(matches!(err, SearchDbError::Statement { .. }));
        assert!(err
            .to_string()
            .contains("Failed to close search database at /tmp/search.sqlite"));
        assert!(err.is_busy());
    }

    #[test]
    fn test_busy_detection() {
        assert!(is_busy_error(&busy()));
        assert!(!is_busy_error(&rusqlite::Error::InvalidQuery));

        let err = SearchDbError::transaction("commit", busy());
        assert!(err.is_busy());
        assert!(!SearchDbError::validation("name", "empty").is_busy());
    }
}
