//! Persisted build status of an index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::IndexType;

/// Lifecycle state of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Complete,
    UpdateInProgress,
    RebuildInProgress,
}

impl IndexStatus {
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, IndexStatus::Complete)
    }
}

/// Build bookkeeping for one index type.
///
/// A status that is still `*InProgress` when a new build starts means the
/// previous attempt never finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBuildStatus {
    pub index_type: IndexType,
    pub index_status: IndexStatus,
    /// When the current (or most recent) build attempt began.
    pub operation_start_date: Option<DateTime<Utc>>,
    /// Low-water mark for the next incremental delta. `None` until the first
    /// successful build.
    pub last_build_date: Option<DateTime<Utc>>,
}

impl IndexBuildStatus {
    /// Status for an index that has never been built.
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            index_status: IndexStatus::Complete,
            operation_start_date: None,
            last_build_date: None,
        }
    }
}
