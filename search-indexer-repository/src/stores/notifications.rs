//! Notification stores.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::SearchError;
use crate::interfaces::NotificationStore;
use search_indexer_shared::{IndexNotification, IndexType, StoredNotification, UpdateType};

const JOURNAL_FILE: &str = "notifications.json";

/// Pending queue shared by both stores.
///
/// Ids come from a single counter guarded by the same lock as the queue, so
/// they are strictly increasing in enqueue order across all index types.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Queue {
    next_id: u64,
    pending: BTreeMap<u64, IndexNotification>,
}

impl Queue {
    fn new() -> Self {
        Self {
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    fn enqueue(&mut self, notification: IndexNotification) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        debug!(
            id = id,
            index_type = %notification.index_type,
            update_type = ?notification.update_type,
            "Notification enqueued"
        );
        self.pending.insert(id, notification);
        id
    }

    fn find_new(&self, index_type: IndexType) -> Vec<StoredNotification> {
        self.pending
            .iter()
            .filter(|(_, n)| n.index_type == index_type)
            .map(|(id, n)| StoredNotification {
                id: *id,
                notification: n.clone(),
            })
            .collect()
    }

    fn find_rebuild(&self, index_type: IndexType) -> Vec<StoredNotification> {
        self.pending
            .iter()
            .rev()
            .filter(|(_, n)| n.index_type == index_type && n.update_type == UpdateType::Rebuild)
            .map(|(id, n)| StoredNotification {
                id: *id,
                notification: n.clone(),
            })
            .collect()
    }

    fn remove_through(&mut self, index_type: IndexType, max_id: u64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|id, n| !(n.index_type == index_type && *id <= max_id));
        let removed = before - self.pending.len();
        debug!(index_type = %index_type, max_id = max_id, removed = removed, "Notifications removed");
        removed
    }
}

/// Process-local notification queue.
pub struct InMemoryNotificationStore {
    inner: Mutex<Queue>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Queue::new()),
        }
    }

    /// Number of pending notifications across all types.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn enqueue(&self, notification: IndexNotification) -> Result<u64, SearchError> {
        Ok(self.inner.lock().await.enqueue(notification))
    }

    async fn find_new_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError> {
        Ok(self.inner.lock().await.find_new(index_type))
    }

    async fn find_rebuild_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError> {
        Ok(self.inner.lock().await.find_rebuild(index_type))
    }

    async fn remove_through(&self, index_type: IndexType, max_id: u64) -> Result<usize, SearchError> {
        Ok(self.inner.lock().await.remove_through(index_type, max_id))
    }
}

/// Notification queue persisted as a JSON journal under a directory.
///
/// Every change rewrites the journal through a temporary file and a rename
/// before it is acknowledged, so a notification that `enqueue` returned an id
/// for survives a restart until a build removes it. The id counter is
/// persisted too, so ids keep increasing across restarts.
pub struct JsonFileNotificationStore {
    path: PathBuf,
    inner: Mutex<Queue>,
}

impl JsonFileNotificationStore {
    /// Open the journal under `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SearchError::store(format!("Failed to create {}: {}", dir.display(), e)))?;

        let path = dir.join(JOURNAL_FILE);
        let queue = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Queue>(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Queue::new(),
            Err(e) => {
                return Err(SearchError::store(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(
            path = %path.display(),
            pending = queue.pending.len(),
            next_id = queue.next_id,
            "Opened notification journal"
        );
        Ok(Self {
            path,
            inner: Mutex::new(queue),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pending notifications across all types.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, queue: &Queue) -> Result<(), SearchError> {
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(queue)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SearchError::store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            SearchError::store(format!("Failed to replace {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl NotificationStore for JsonFileNotificationStore {
    async fn enqueue(&self, notification: IndexNotification) -> Result<u64, SearchError> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.clone();
        let id = next.enqueue(notification);
        self.persist(&next).await?;
        *inner = next;
        Ok(id)
    }

    async fn find_new_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError> {
        Ok(self.inner.lock().await.find_new(index_type))
    }

    async fn find_rebuild_notifications(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<StoredNotification>, SearchError> {
        Ok(self.inner.lock().await.find_rebuild(index_type))
    }

    async fn remove_through(&self, index_type: IndexType, max_id: u64) -> Result<usize, SearchError> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.clone();
        let removed = next.remove_through(index_type, max_id);
        if removed > 0 {
            self.persist(&next).await?;
            *inner = next;
        }
        Ok(removed)
    }
}
