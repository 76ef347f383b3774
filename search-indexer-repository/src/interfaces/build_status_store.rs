//! Build status store trait definition.

use async_trait::async_trait;

use crate::errors::SearchError;
use search_indexer_shared::{IndexBuildStatus, IndexType};

/// Persistent home of [`IndexBuildStatus`] records, one per index type.
#[async_trait]
pub trait BuildStatusStore: Send + Sync {
    /// Load the persisted status, if any.
    async fn load(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>, SearchError>;

    /// Persist the status, replacing any previous record for its type.
    async fn save(&self, status: &IndexBuildStatus) -> Result<(), SearchError>;
}
