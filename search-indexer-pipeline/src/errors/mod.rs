//! Error types for the search indexer pipeline.

use search_indexer_repository::SearchError;
use search_indexer_shared::{IndexType, UnknownIndexType};
use thiserror::Error;

/// Errors that can occur while building or publishing an index.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Misconfiguration (missing collaborator, missing path mapping, bad
    /// index location). Never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from the search engine or a store.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// Error from a domain index builder.
    #[error("Builder error: {0}")]
    BuilderError(String),

    /// The operation was interrupted; the build it belongs to is unfinished.
    #[error("Pipeline interrupted")]
    Interrupted,

    /// The publisher no longer accepts commands.
    #[error("Publisher for {0} is closed")]
    PublisherClosed(IndexType),
}

impl PipelineError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a builder error.
    pub fn builder(msg: impl Into<String>) -> Self {
        Self::BuilderError(msg.into())
    }

    /// Whether this error signals an interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::SearchError(e) => e.is_interrupted(),
            _ => false,
        }
    }
}

impl From<UnknownIndexType> for PipelineError {
    fn from(err: UnknownIndexType) -> Self {
        Self::ConfigError(err.to_string())
    }
}
