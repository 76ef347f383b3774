//! Physical index existence checks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PipelineError;
use search_indexer_repository::SearchEngineClient;
use search_indexer_shared::IndexType;

/// Commit generation of a freshly initialized index that was never written.
pub const INITIAL_INDEX_VERSION: u64 = 1;

const SEGMENTS_PREFIX: &str = "segments_";

/// Answers whether a usable physical index exists for a type.
#[async_trait]
pub trait IndexExistencePredicate: Send + Sync {
    async fn exists(&self, index_type: IndexType) -> Result<bool, PipelineError>;
}

/// Existence check against local index directories.
///
/// An index exists when its directory holds a commit generation newer than
/// [`INITIAL_INDEX_VERSION`].
#[derive(Debug, Clone, Default)]
pub struct FsIndexExistence {
    locations: HashMap<IndexType, PathBuf>,
}

impl FsIndexExistence {
    pub fn new(locations: HashMap<IndexType, PathBuf>) -> Self {
        Self { locations }
    }

    /// Map every type to `<base_dir>/<index name>`.
    pub fn under(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        let locations = IndexType::ALL
            .iter()
            .map(|t| (*t, base_dir.join(t.index_name())))
            .collect();
        Self { locations }
    }

    pub fn location(&self, index_type: IndexType) -> Option<&Path> {
        self.locations.get(&index_type).map(PathBuf::as_path)
    }
}

/// Generation encoded in a `segments_<gen>` file name, base 36.
fn parse_generation(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix(SEGMENTS_PREFIX)?;
    u64::from_str_radix(digits, 36).ok()
}

/// Highest commit generation found in the directory, 0 when there is none.
async fn read_generation(dir: &Path) -> std::io::Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut generation = 0;

    while let Some(entry) = entries.next_entry().await? {
        if let Some(found) = entry.file_name().to_str().and_then(parse_generation) {
            generation = generation.max(found);
        }
    }
    Ok(generation)
}

#[async_trait]
impl IndexExistencePredicate for FsIndexExistence {
    async fn exists(&self, index_type: IndexType) -> Result<bool, PipelineError> {
        let dir = self.locations.get(&index_type).ok_or_else(|| {
            PipelineError::config(format!("No index location configured for {index_type}"))
        })?;

        let generation = read_generation(dir).await.map_err(|e| {
            PipelineError::config(format!(
                "Cannot read index location {} for {index_type}: {e}",
                dir.display()
            ))
        })?;

        debug!(index_type = %index_type, generation = generation, "Read index generation");
        Ok(generation > INITIAL_INDEX_VERSION)
    }
}

/// Existence check delegated to the search engine.
pub struct EngineIndexExistence {
    engine: Arc<dyn SearchEngineClient>,
}

impl EngineIndexExistence {
    pub fn new(engine: Arc<dyn SearchEngineClient>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl IndexExistencePredicate for EngineIndexExistence {
    async fn exists(&self, index_type: IndexType) -> Result<bool, PipelineError> {
        Ok(self.engine.index_exists(index_type).await?)
    }
}
