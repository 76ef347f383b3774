//! Build status stores.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::SearchError;
use crate::interfaces::BuildStatusStore;
use search_indexer_shared::{IndexBuildStatus, IndexType};

/// Keeps status records in memory only.
#[derive(Default)]
pub struct InMemoryBuildStatusStore {
    records: RwLock<HashMap<IndexType, IndexBuildStatus>>,
}

impl InMemoryBuildStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, e.g. one left behind by a crashed process.
    pub async fn insert(&self, status: IndexBuildStatus) {
        self.records.write().await.insert(status.index_type, status);
    }
}

#[async_trait]
impl BuildStatusStore for InMemoryBuildStatusStore {
    async fn load(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>, SearchError> {
        Ok(self.records.read().await.get(&index_type).cloned())
    }

    async fn save(&self, status: &IndexBuildStatus) -> Result<(), SearchError> {
        self.records
            .write()
            .await
            .insert(status.index_type, status.clone());
        Ok(())
    }
}

/// Persists one JSON file per index type under a directory.
///
/// Writes go to a temporary file that is then renamed over the record, so a
/// crash never leaves a half-written status behind.
pub struct JsonFileBuildStatusStore {
    dir: PathBuf,
}

impl JsonFileBuildStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, index_type: IndexType) -> PathBuf {
        self.dir.join(format!("{}.status.json", index_type.index_name()))
    }
}

#[async_trait]
impl BuildStatusStore for JsonFileBuildStatusStore {
    async fn load(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>, SearchError> {
        let path = self.record_path(index_type);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let status: IndexBuildStatus = serde_json::from_slice(&bytes)?;
                Ok(Some(status))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SearchError::store(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, status: &IndexBuildStatus) -> Result<(), SearchError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SearchError::store(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let path = self.record_path(status.index_type);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(status)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SearchError::store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SearchError::store(format!("Failed to replace {}: {}", path.display(), e)))?;

        debug!(
            index_type = %status.index_type,
            index_status = ?status.index_status,
            "Build status persisted"
        );
        Ok(())
    }
}
