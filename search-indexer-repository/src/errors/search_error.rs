//! Search error types.
//!
//! This module defines the error types that can occur while talking to the
//! search engine or to the pipeline's bookkeeping stores.

use thiserror::Error;

/// Errors that can occur during search engine and store operations.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Raw query execution failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to add or update a document.
    #[error("Index error: {0}")]
    IndexError(String),

    /// Bulk add had failures.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to delete one document or the whole index content.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Commit (making changes visible) failed.
    #[error("Commit error: {0}")]
    CommitError(String),

    /// Optimize (segment merge) failed.
    #[error("Optimize error: {0}")]
    OptimizeError(String),

    /// Failed to parse response from search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search engine or a store.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Notification or build status store failure.
    #[error("Store error: {0}")]
    StoreError(String),

    /// The operation was interrupted and must not be retried in place.
    #[error("Operation interrupted")]
    Interrupted,
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a commit error.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::CommitError(msg.into())
    }

    /// Create an optimize error.
    pub fn optimize(msg: impl Into<String>) -> Self {
        Self::OptimizeError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// Whether this error signals an interruption rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SearchError::commit("boom").to_string(), "Commit error: boom");
        assert_eq!(SearchError::Interrupted.to_string(), "Operation interrupted");
    }

    #[test]
    fn test_is_interrupted() {
        assert!(SearchError::Interrupted.is_interrupted());
        assert!(!SearchError::delete("x").is_interrupted());
    }
}
