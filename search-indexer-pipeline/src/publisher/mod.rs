//! Document publisher module.
//!
//! Publishers take per-document mutations and get them into the search
//! engine. Two interchangeable variants exist:
//!
//! 1. **Queueing**: bounded queue drained by one background worker
//! 2. **Simple**: in-caller buffering with policy-driven sends and commits

mod command;
mod queueing;
mod simple;

pub use command::PublishCommand;
pub use queueing::{PublisherStats, QueueingDocumentPublisher, QueueingPublisherConfig};
pub use simple::{NoopSessionCache, SessionCache, SimpleDocumentPublisher};

use async_trait::async_trait;

use crate::errors::PipelineError;
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// Delivers document mutations for one index type to the search engine.
#[async_trait]
pub trait DocumentPublisher: Send + Sync {
    /// The index this publisher writes to.
    fn index_type(&self) -> IndexType;

    /// Prepare the publisher for use.
    async fn start(&self) -> Result<(), PipelineError>;

    /// Add or replace a document.
    async fn add_update(&self, document: SearchDocument) -> Result<(), PipelineError>;

    /// Remove a document by uid.
    async fn delete_document(&self, uid: Uid) -> Result<(), PipelineError>;

    /// Push out anything buffered.
    async fn flush(&self) -> Result<(), PipelineError>;

    /// Make everything published so far visible.
    async fn commit(&self) -> Result<(), PipelineError>;

    /// Stop accepting work after delivering what was already accepted.
    async fn shutdown(&self) -> Result<(), PipelineError>;

    /// Whether accepted work is still waiting to reach the engine.
    fn is_busy(&self) -> bool;
}
