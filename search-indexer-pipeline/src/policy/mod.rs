//! Build policy module.
//!
//! Decides when buffered documents are sent, when changes are committed and
//! when an index is due for optimization.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use search_indexer_shared::IndexType;

/// Configuration for the build policy.
#[derive(Debug, Clone)]
pub struct BuildPolicyConfig {
    /// Send buffered documents every this many additions.
    pub max_docs_before_add: u64,
    /// Commit every this many operations (adds plus deletes).
    pub max_operations_before_commit: u64,
    /// Optimize interval for types without an override, in minutes.
    pub default_optimize_interval_minutes: i64,
    /// Per-type optimize intervals, in minutes.
    pub optimize_intervals: HashMap<IndexType, i64>,
}

impl Default for BuildPolicyConfig {
    fn default() -> Self {
        Self {
            max_docs_before_add: 500,
            max_operations_before_commit: 5000,
            default_optimize_interval_minutes: 60,
            optimize_intervals: HashMap::new(),
        }
    }
}

/// Running counters a publisher hands to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicyContext {
    pub index_type: IndexType,
    pub documents_added: u64,
    pub operations_count: u64,
}

impl BuildPolicyContext {
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            documents_added: 0,
            operations_count: 0,
        }
    }
}

/// Commit and optimize cadence.
///
/// The add and commit decisions are pure functions of the context. The
/// optimize decision is a per-type single-shot timer: the first query for a
/// type starts its clock, and every `true` answer restarts it.
pub struct BuildPolicy {
    config: BuildPolicyConfig,
    last_optimization: HashMap<IndexType, Mutex<Option<DateTime<Utc>>>>,
}

impl BuildPolicy {
    pub fn new(config: BuildPolicyConfig) -> Self {
        let last_optimization = IndexType::ALL
            .iter()
            .map(|t| (*t, Mutex::new(None)))
            .collect();

        Self {
            config,
            last_optimization,
        }
    }

    pub fn config(&self) -> &BuildPolicyConfig {
        &self.config
    }

    /// Whether the buffered documents should be sent now.
    pub fn is_add_documents_required(&self, context: &BuildPolicyContext) -> bool {
        context.documents_added % self.config.max_docs_before_add.max(1) == 0
    }

    /// Whether a commit should be issued now.
    pub fn is_commit_required(&self, context: &BuildPolicyContext) -> bool {
        context.operations_count % self.config.max_operations_before_commit.max(1) == 0
    }

    /// Optimize interval configured for the type.
    ///
    /// `None` when the configured minutes do not fit a [`Duration`].
    pub fn optimize_interval(&self, index_type: IndexType) -> Option<Duration> {
        let minutes = self
            .config
            .optimize_intervals
            .get(&index_type)
            .copied()
            .unwrap_or(self.config.default_optimize_interval_minutes);
        Duration::try_minutes(minutes.max(0))
    }

    /// Whether the index is due for optimization.
    ///
    /// Returning `true` restarts the type's interval. An interval too large
    /// to reach is never due.
    pub fn is_optimization_required(&self, context: &BuildPolicyContext) -> bool {
        self.is_optimization_required_at(context, Utc::now())
    }

    /// [`Self::is_optimization_required`] evaluated at a given instant.
    pub fn is_optimization_required_at(
        &self,
        context: &BuildPolicyContext,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(slot) = self.last_optimization.get(&context.index_type) else {
            return false;
        };
        let mut last = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let since = *last.get_or_insert(now);
        let due = self
            .optimize_interval(context.index_type)
            .and_then(|interval| since.checked_add_signed(interval));

        if due.is_some_and(|due| now >= due) {
            *last = Some(now);
            debug!(index_type = %context.index_type, "Optimization due");
            true
        } else {
            false
        }
    }
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self::new(BuildPolicyConfig::default())
    }
}
