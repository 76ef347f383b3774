//! Search engine client trait definition.
//!
//! This module defines the abstract engine handle used by the build pipeline,
//! allowing for different backend implementations (OpenSearch, Solr, mocks).

use async_trait::async_trait;

use crate::errors::SearchError;
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// Abstract interface for search engine operations.
///
/// One handle is shared by every index type of a process; each call names the
/// index it targets.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks
/// and from the background publisher workers.
///
/// # Error Handling
///
/// All methods return `Result<T, SearchError>`. An implementation that is
/// stopped mid-operation should return [`SearchError::Interrupted`].
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Add a document, replacing any existing document with the same uid.
    ///
    /// # Arguments
    ///
    /// * `index_type` - The target index
    /// * `document` - The document to upsert
    async fn add_or_update(
        &self,
        index_type: IndexType,
        document: &SearchDocument,
    ) -> Result<(), SearchError>;

    /// Add multiple documents in a single bulk operation.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If all documents were accepted
    /// * `Err(SearchError::BulkIndexError)` - If any document failed
    async fn add_documents(
        &self,
        index_type: IndexType,
        documents: &[SearchDocument],
    ) -> Result<(), SearchError>;

    /// Delete one document. Deleting an absent document succeeds.
    async fn delete_document(&self, index_type: IndexType, uid: Uid) -> Result<(), SearchError>;

    /// Remove every document of the index.
    async fn delete_all(&self, index_type: IndexType) -> Result<(), SearchError>;

    /// Make all previously applied changes visible to searchers.
    async fn commit(&self, index_type: IndexType) -> Result<(), SearchError>;

    /// Merge index segments to reduce fragmentation.
    async fn optimize(&self, index_type: IndexType) -> Result<(), SearchError>;

    /// Run a raw engine query and return the uids of every matching document.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let uids = client.find_uids(IndexType::Product, "categoryCode:shirts").await?;
    /// ```
    async fn find_uids(&self, index_type: IndexType, raw_query: &str) -> Result<Vec<Uid>, SearchError>;

    /// Check whether the engine holds an index for the type.
    async fn index_exists(&self, index_type: IndexType) -> Result<bool, SearchError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the search engine is healthy
    /// * `Ok(false)` - If the search engine is unhealthy
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
