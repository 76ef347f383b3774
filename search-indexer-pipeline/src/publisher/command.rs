//! Units of work on the publish queue.

use search_indexer_repository::{SearchEngineClient, SearchError};
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// One queued engine mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishCommand {
    /// Upsert a document.
    AddUpdate(SearchDocument),
    /// Delete a document by uid.
    Delete(Uid),
    /// Sentinel that stops the worker once everything ahead of it is applied.
    Shutdown,
}

impl PublishCommand {
    /// Perform the command's side effect. `Shutdown` does nothing.
    pub async fn apply(
        &self,
        engine: &dyn SearchEngineClient,
        index_type: IndexType,
    ) -> Result<(), SearchError> {
        match self {
            PublishCommand::AddUpdate(document) => engine.add_or_update(index_type, document).await,
            PublishCommand::Delete(uid) => engine.delete_document(index_type, *uid).await,
            PublishCommand::Shutdown => Ok(()),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, PublishCommand::Shutdown)
    }
}
