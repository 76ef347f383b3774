//! Change notification store trait definition.

use async_trait::async_trait;

use crate::errors::SearchError;
use search_indexer_shared::{IndexNotification, IndexType, StoredNotification};

/// Queue of pending change notifications, drained per index type.
///
/// Producers are many and concurrent; each index type has a single consumer
/// (its build). Delivery is at-least-once: a notification stays in the store
/// until a build that covered it succeeds, so consumers must tolerate
/// duplicates.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Record a notification and return its assigned id.
    async fn enqueue(&self, notification: IndexNotification) -> Result<u64, SearchError>;

    /// All pending notifications for the type, in ascending id order.
    async fn find_new_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError>;

    /// Pending `Rebuild` notifications for the type, most recent first.
    async fn find_rebuild_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError>;

    /// Remove every notification of the type whose id is `<= max_id`.
    ///
    /// Returns how many were removed.
    async fn remove_through(&self, index_type: IndexType, max_id: u64) -> Result<usize, SearchError>;
}
