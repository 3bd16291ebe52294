//! Error types for Schemagate
//!
//! This module defines all error types used by the schema model, the query
//! engine and the server front end.

use thiserror::Error;

/// The main error type for Schemagate
#[derive(Error, Debug)]
pub enum Error {
    // ========== Query Engine Errors ==========
    #[error("Query error: record not found")]
    NotFound,

    #[error("Query error: invalid filter - {0}")]
    InvalidFilter(String),

    #[error("Query error: invalid include - {0}")]
    InvalidInclude(String),

    #[error("Query error: insert failed - {0}")]
    InsertFailed(String),

    // ========== Schema Errors ==========
    #[error("Schema error: corrupted schema - {0}")]
    SchemaCorrupted(String),

    #[error("Schema error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Schema error: no to-many relationship from '{0}' to '{1}'")]
    NoRelationship(String, String),

    // ========== Server Errors ==========
    #[error("Server error: writes are disabled in read-only mode")]
    ReadOnly,

    #[error("Configuration error: {0}")]
    Config(String),

    // ========== Store Errors ==========
    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transport status for the boundary layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound | Error::TableNotFound(_) | Error::NoRelationship(_, _) => 404,
            Error::InvalidFilter(_) | Error::InvalidInclude(_) | Error::Json(_) => 400,
            Error::ReadOnly => 405,
            Error::InsertFailed(_) => 409,
            _ => 500,
        }
    }
}

/// Result type alias for Schemagate operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Schema error: table 'users' not found");

        let err = Error::SchemaCorrupted("line_items references unknown table 'orders'".into());
        assert_eq!(
            err.to_string(),
            "Schema error: corrupted schema - line_items references unknown table 'orders'"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound.status_code(), 404);
        assert_eq!(Error::InvalidFilter("x".into()).status_code(), 400);
        assert_eq!(Error::InvalidInclude("x".into()).status_code(), 400);
        assert_eq!(Error::InsertFailed("x".into()).status_code(), 409);
        assert_eq!(Error::ReadOnly.status_code(), 405);
        assert_eq!(Error::Internal("boom".into()).status_code(), 500);
    }
}
