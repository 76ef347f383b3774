//! OpenSearch index naming and settings.

use serde_json::{json, Value};

use search_indexer_shared::IndexType;

/// Default prefix prepended to every index name.
pub const DEFAULT_INDEX_PREFIX: &str = "ep";

/// Maps index types to physical OpenSearch index names.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Prefix shared by all indexes of one deployment.
    pub prefix: String,
}

impl IndexConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Physical index name, `{prefix}_{index_name}`.
    pub fn index_name(&self, index_type: IndexType) -> String {
        if self.prefix.is_empty() {
            index_type.index_name().to_string()
        } else {
            format!("{}_{}", self.prefix, index_type.index_name())
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_PREFIX)
    }
}

/// Settings used when an index is created implicitly by the first write.
///
/// Refresh is disabled so that documents only become visible on an explicit
/// commit, matching the publish-then-commit cadence of the pipeline.
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "refresh_interval": "-1"
        }
    })
}
