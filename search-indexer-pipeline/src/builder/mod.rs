//! Domain index builder contract.
//!
//! Builders live in the domain layer. They know how to find the entities
//! behind an index and how to turn them into documents; the orchestrator only
//! hands them uids.

mod pipeline_status;

pub use pipeline_status::PipelineStatus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::PipelineError;
use search_indexer_repository::SearchEngineClient;
use search_indexer_shared::{IndexNotification, IndexType, Uid};

/// Per-type collaborator that enumerates entities and publishes documents.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// The index this builder maintains.
    fn index_type(&self) -> IndexType;

    /// Name used in log output.
    fn name(&self) -> &str {
        self.index_type().index_name()
    }

    /// Every live uid of the type.
    async fn find_all_uids(&self) -> Result<Vec<Uid>, PipelineError>;

    /// Page size for paginated rebuilds, or `None` if the builder enumerates
    /// everything at once through [`IndexBuilder::find_all_uids`].
    fn page_size(&self) -> Option<usize> {
        None
    }

    /// One page of indexable uids. An empty page ends the enumeration.
    async fn find_indexable_uids_paginated(&self, _page: usize) -> Result<Vec<Uid>, PipelineError> {
        Ok(Vec::new())
    }

    /// Uids added or modified in storage since the given instant.
    async fn find_added_or_modified_uids(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Uid>, PipelineError>;

    /// Uids deleted from storage since the given instant.
    async fn find_deleted_uids(&self, since: DateTime<Utc>) -> Result<Vec<Uid>, PipelineError>;

    /// Expand a notification about a related entity into affected uids.
    async fn find_uids_by_notification(
        &self,
        notification: &IndexNotification,
    ) -> Result<Vec<Uid>, PipelineError>;

    /// Build and publish documents for the uids.
    ///
    /// Work may continue after this returns; the returned status, if any,
    /// completes when it is done.
    async fn submit(&self, uids: Vec<Uid>) -> Result<Option<PipelineStatus>, PipelineError>;

    /// Called before the first engine write of a build.
    async fn on_index_updating(&self, _engine: &dyn SearchEngineClient) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called after the final commit of a build that wrote to the engine.
    async fn on_index_updated(&self, _engine: &dyn SearchEngineClient) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Build-complete callback, fired before the final commit.
    fn on_build_complete(&self) {}
}
