//! Build outcome reporting.

use std::fmt;

use chrono::{DateTime, Utc};

use search_indexer_shared::IndexType;

/// Why a build dropped the index and re-populated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// The previous rebuild never finished.
    Interrupted,
    /// The index was never built successfully.
    FirstBuild,
    /// A rebuild notification was pending.
    Requested,
    /// No physical index was found.
    MissingIndex,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RebuildReason::Interrupted => "interrupted",
            RebuildReason::FirstBuild => "first_build",
            RebuildReason::Requested => "requested",
            RebuildReason::MissingIndex => "missing_index",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Incremental,
    Rebuild(RebuildReason),
}

/// Summary of one finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub index_type: IndexType,
    pub mode: BuildMode,
    pub documents_submitted: usize,
    pub documents_deleted: usize,
    /// Whether the build performed any engine I/O.
    pub engine_touched: bool,
    pub last_build_date: DateTime<Utc>,
}

impl BuildReport {
    pub fn is_rebuild(&self) -> bool {
        matches!(self.mode, BuildMode::Rebuild(_))
    }
}
