//! Orchestrator module for the search index build pipeline.
//!
//! Owns the per-type build status, decides between an incremental update and
//! a full rebuild, drives the resolver and the publishers, and finalizes the
//! status once the engine holds the result.

mod report;

pub use report::{BuildMode, BuildReport, RebuildReason};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::builder::IndexBuilder;
use crate::errors::PipelineError;
use crate::existence::IndexExistencePredicate;
use crate::policy::{BuildPolicy, BuildPolicyContext};
use crate::publisher::DocumentPublisher;
use crate::resolver::ChangeDeltaResolver;
use search_indexer_repository::{BuildStatusStore, NotificationStore, SearchEngineClient};
use search_indexer_shared::{IndexBuildStatus, IndexNotification, IndexStatus, IndexType, Uid};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on resolve-and-publish iterations of one incremental build.
    pub max_build_iterations: usize,
    /// Types the optimize sweep never touches.
    pub optimize_exclusions: HashSet<IndexType>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_build_iterations: 3,
            optimize_exclusions: HashSet::new(),
        }
    }
}

/// Per-type state created up front for every index type.
struct IndexSlot {
    /// Serializes builds of the type.
    build_lock: Mutex<()>,
    /// Never held across engine I/O.
    status: Mutex<Option<IndexBuildStatus>>,
}

impl IndexSlot {
    fn new() -> Self {
        Self {
            build_lock: Mutex::new(()),
            status: Mutex::new(None),
        }
    }
}

struct Registration {
    builder: Arc<dyn IndexBuilder>,
    publisher: Arc<dyn DocumentPublisher>,
}

enum Plan {
    Incremental { since: DateTime<Utc> },
    Rebuild(RebuildReason),
}

#[derive(Debug, Default)]
struct BuildOutcome {
    documents_submitted: usize,
    documents_deleted: usize,
    engine_touched: bool,
    resolved_through: Option<u64>,
    completion_date: Option<DateTime<Utc>>,
}

/// Builds and maintains the search indexes.
///
/// Builds of one type never overlap; builds of different types run
/// concurrently. A build that fails leaves its status `*InProgress` and the
/// next build of the type recovers from it.
pub struct IndexBuildOrchestrator {
    engine: Arc<dyn SearchEngineClient>,
    notifications: Arc<dyn NotificationStore>,
    status_store: Arc<dyn BuildStatusStore>,
    existence: Arc<dyn IndexExistencePredicate>,
    policy: Arc<BuildPolicy>,
    resolver: ChangeDeltaResolver,
    config: OrchestratorConfig,
    slots: HashMap<IndexType, IndexSlot>,
    registrations: HashMap<IndexType, Registration>,
}

impl IndexBuildOrchestrator {
    pub fn new(
        engine: Arc<dyn SearchEngineClient>,
        notifications: Arc<dyn NotificationStore>,
        status_store: Arc<dyn BuildStatusStore>,
        existence: Arc<dyn IndexExistencePredicate>,
        policy: Arc<BuildPolicy>,
        config: OrchestratorConfig,
    ) -> Self {
        let resolver = ChangeDeltaResolver::new(engine.clone(), notifications.clone());
        let slots = IndexType::ALL.iter().map(|t| (*t, IndexSlot::new())).collect();

        Self {
            engine,
            notifications,
            status_store,
            existence,
            policy,
            resolver,
            config,
            slots,
            registrations: HashMap::new(),
        }
    }

    /// Register the builder and publisher of one index type.
    pub fn register(
        &mut self,
        builder: Arc<dyn IndexBuilder>,
        publisher: Arc<dyn DocumentPublisher>,
    ) -> Result<(), PipelineError> {
        let index_type = builder.index_type();
        if publisher.index_type() != index_type {
            return Err(PipelineError::config(format!(
                "Publisher for {} registered with builder for {}",
                publisher.index_type(),
                index_type
            )));
        }
        if self
            .registrations
            .insert(index_type, Registration { builder, publisher })
            .is_some()
        {
            warn!(index_type = %index_type, "Replaced existing registration");
        }
        Ok(())
    }

    /// Types with a registered builder, in [`IndexType::ALL`] order.
    pub fn registered_types(&self) -> Vec<IndexType> {
        IndexType::ALL
            .iter()
            .copied()
            .filter(|t| self.registrations.contains_key(t))
            .collect()
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngineClient> {
        &self.engine
    }

    /// Start every registered publisher.
    pub async fn start(&self) -> Result<(), PipelineError> {
        for registration in self.registrations.values() {
            registration.publisher.start().await?;
        }
        info!(index_types = self.registrations.len(), "Publishers started");
        Ok(())
    }

    /// Shut every registered publisher down, delivering accepted work first.
    ///
    /// All publishers are attempted; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let mut first_error = None;
        for (index_type, registration) in &self.registrations {
            if let Err(e) = registration.publisher.shutdown().await {
                error!(index_type = %index_type, error = %e, "Failed to shut down publisher");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn registration(&self, index_type: IndexType) -> Result<&Registration, PipelineError> {
        self.registrations
            .get(&index_type)
            .ok_or_else(|| PipelineError::config(format!("No index builder registered for {index_type}")))
    }

    fn slot(&self, index_type: IndexType) -> Result<&IndexSlot, PipelineError> {
        self.slots
            .get(&index_type)
            .ok_or_else(|| PipelineError::config(format!("No status slot for {index_type}")))
    }

    /// Build the index of one type, incrementally or from scratch.
    #[instrument(skip(self), fields(index_type = %index_type, build_id = %Uuid::new_v4()))]
    pub async fn build_index(&self, index_type: IndexType) -> Result<BuildReport, PipelineError> {
        let registration = self.registration(index_type)?;
        let slot = self.slot(index_type)?;
        let _guard = slot.build_lock.lock().await;

        let operation_start = Utc::now();
        let previous = self.begin(slot, index_type, operation_start).await?;
        let plan = self.plan(index_type, &previous).await?;

        let (mode, in_progress) = match &plan {
            Plan::Incremental { .. } => (BuildMode::Incremental, IndexStatus::UpdateInProgress),
            Plan::Rebuild(reason) => (BuildMode::Rebuild(*reason), IndexStatus::RebuildInProgress),
        };
        self.transition(slot, |status| status.index_status = in_progress)
            .await?;
        info!(
            builder = registration.builder.name(),
            mode = ?mode,
            "Starting index build"
        );

        let outcome = match plan {
            Plan::Incremental { since } => self.update(registration, since).await?,
            Plan::Rebuild(_) => self.rebuild(registration).await?,
        };

        let last_build_date = self
            .finalize(registration, slot, &previous, operation_start, &outcome)
            .await?;

        info!(
            mode = ?mode,
            submitted = outcome.documents_submitted,
            deleted = outcome.documents_deleted,
            engine_touched = outcome.engine_touched,
            "Index build complete"
        );

        Ok(BuildReport {
            index_type,
            mode,
            documents_submitted: outcome.documents_submitted,
            documents_deleted: outcome.documents_deleted,
            engine_touched: outcome.engine_touched,
            last_build_date,
        })
    }

    /// Record the start of a build and return the status as it was before.
    async fn begin(
        &self,
        slot: &IndexSlot,
        index_type: IndexType,
        operation_start: DateTime<Utc>,
    ) -> Result<IndexBuildStatus, PipelineError> {
        let mut cell = slot.status.lock().await;
        let previous = match cell.as_ref() {
            Some(status) => status.clone(),
            None => self
                .status_store
                .load(index_type)
                .await?
                .unwrap_or_else(|| IndexBuildStatus::new(index_type)),
        };

        let mut current = previous.clone();
        current.operation_start_date = Some(operation_start);
        self.status_store.save(&current).await?;
        *cell = Some(current);

        Ok(previous)
    }

    async fn transition(
        &self,
        slot: &IndexSlot,
        change: impl FnOnce(&mut IndexBuildStatus),
    ) -> Result<(), PipelineError> {
        let mut cell = slot.status.lock().await;
        let status = cell
            .as_mut()
            .ok_or_else(|| PipelineError::config("Build status missing during build"))?;
        change(status);
        self.status_store.save(status).await?;
        Ok(())
    }

    async fn plan(&self, index_type: IndexType, previous: &IndexBuildStatus) -> Result<Plan, PipelineError> {
        if previous.index_status == IndexStatus::RebuildInProgress {
            return Ok(Plan::Rebuild(RebuildReason::Interrupted));
        }
        let Some(since) = previous.last_build_date else {
            return Ok(Plan::Rebuild(RebuildReason::FirstBuild));
        };
        if self.is_rebuild_requested(index_type).await? {
            return Ok(Plan::Rebuild(RebuildReason::Requested));
        }
        if !self.existence.exists(index_type).await? {
            return Ok(Plan::Rebuild(RebuildReason::MissingIndex));
        }
        if previous.index_status == IndexStatus::UpdateInProgress {
            warn!(index_type = %index_type, "Previous update did not finish, re-deriving its delta");
        }
        Ok(Plan::Incremental { since })
    }

    async fn is_rebuild_requested(&self, index_type: IndexType) -> Result<bool, PipelineError> {
        Ok(!self
            .notifications
            .find_rebuild_notifications(index_type)
            .await?
            .is_empty())
    }

    async fn update(
        &self,
        registration: &Registration,
        since: DateTime<Utc>,
    ) -> Result<BuildOutcome, PipelineError> {
        let builder = registration.builder.as_ref();
        let index_type = builder.index_type();
        let mut outcome = BuildOutcome::default();
        let mut iteration = 0;

        loop {
            iteration += 1;
            let delta = if iteration == 1 {
                self.resolver
                    .resolve(builder, since, outcome.resolved_through)
                    .await?
            } else {
                self.resolver
                    .resolve_notifications_only(builder, outcome.resolved_through)
                    .await?
            };

            if iteration > 1 && delta.resolved_through.is_none() {
                break;
            }
            outcome.resolved_through = outcome.resolved_through.max(delta.resolved_through);

            if delta.is_empty() {
                debug!(iteration = iteration, "Nothing to index");
            } else {
                if !outcome.engine_touched {
                    builder.on_index_updating(self.engine.as_ref()).await?;
                    outcome.engine_touched = true;
                }

                let mut added: Vec<Uid> = delta.added_or_modified.into_iter().collect();
                added.sort_unstable();
                if !added.is_empty() {
                    outcome.documents_submitted += added.len();
                    self.submit(builder, added, &mut outcome).await?;
                }

                let mut deleted: Vec<Uid> = delta.deleted.into_iter().collect();
                deleted.sort_unstable();
                for uid in deleted {
                    registration.publisher.delete_document(uid).await?;
                    outcome.documents_deleted += 1;
                }
            }

            if iteration >= self.config.max_build_iterations.max(1) {
                break;
            }
            if !self.has_newer_notifications(index_type, outcome.resolved_through).await? {
                break;
            }
            debug!(iteration = iteration, "Notifications arrived during build, catching up");
        }

        Ok(outcome)
    }

    async fn has_newer_notifications(
        &self,
        index_type: IndexType,
        after: Option<u64>,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .notifications
            .find_new_notifications(index_type)
            .await?
            .iter()
            .any(|stored| after.map_or(true, |after| stored.id > after)))
    }

    async fn rebuild(&self, registration: &Registration) -> Result<BuildOutcome, PipelineError> {
        let builder = registration.builder.as_ref();
        let index_type = builder.index_type();

        // everything pending now is covered by the rebuild
        let snapshot = self
            .notifications
            .find_new_notifications(index_type)
            .await?
            .iter()
            .map(|stored| stored.id)
            .max();
        let mut outcome = BuildOutcome {
            engine_touched: true,
            resolved_through: snapshot,
            ..Default::default()
        };

        builder.on_index_updating(self.engine.as_ref()).await?;

        match builder.page_size() {
            Some(page_size) => {
                self.engine.delete_all(index_type).await?;
                let mut page = 0;
                loop {
                    let uids = builder.find_indexable_uids_paginated(page).await?;
                    if uids.is_empty() {
                        break;
                    }
                    debug!(page = page, page_size = page_size, count = uids.len(), "Submitting page");
                    outcome.documents_submitted += uids.len();
                    self.submit(builder, uids, &mut outcome).await?;
                    page += 1;
                }
            }
            None => {
                let uids = builder.find_all_uids().await?;
                self.engine.delete_all(index_type).await?;
                if !uids.is_empty() {
                    outcome.documents_submitted = uids.len();
                    self.submit(builder, uids, &mut outcome).await?;
                }
            }
        }

        if outcome.documents_submitted == 0 {
            self.engine.commit(index_type).await?;
            debug!("Committed empty index");
        }

        Ok(outcome)
    }

    /// Hand uids to the builder and wait for its pipeline to complete.
    async fn submit(
        &self,
        builder: &dyn IndexBuilder,
        uids: Vec<Uid>,
        outcome: &mut BuildOutcome,
    ) -> Result<(), PipelineError> {
        let count = uids.len();
        let Some(status) = builder.submit(uids).await? else {
            error!(
                count = count,
                "Pipeline status could not be found, continuing without waiting for completion"
            );
            return Ok(());
        };

        match status.wait_until_completed().await {
            Ok(completed_at) => {
                outcome.completion_date = outcome.completion_date.max(Some(completed_at));
                debug!(count = count, "Pipeline completed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Interrupted while waiting for the pipeline to complete");
                Err(PipelineError::Interrupted)
            }
        }
    }

    async fn finalize(
        &self,
        registration: &Registration,
        slot: &IndexSlot,
        previous: &IndexBuildStatus,
        operation_start: DateTime<Utc>,
        outcome: &BuildOutcome,
    ) -> Result<DateTime<Utc>, PipelineError> {
        let index_type = registration.builder.index_type();

        if outcome.engine_touched {
            registration.builder.on_build_complete();
            registration.publisher.flush().await?;
            registration.publisher.commit().await?;
            registration.builder.on_index_updated(self.engine.as_ref()).await?;
        }

        if let Some(through) = outcome.resolved_through {
            let removed = self.notifications.remove_through(index_type, through).await?;
            debug!(removed = removed, through = through, "Removed resolved notifications");
        }

        let last_build_date = [
            Some(operation_start),
            outcome.completion_date,
            previous.last_build_date,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(operation_start);

        self.transition(slot, |status| {
            status.index_status = IndexStatus::Complete;
            status.last_build_date = Some(last_build_date);
        })
        .await?;

        Ok(last_build_date)
    }

    /// Current status of one type.
    pub async fn status(&self, index_type: IndexType) -> Result<IndexBuildStatus, PipelineError> {
        if let Some(status) = self.slot(index_type)?.status.lock().await.clone() {
            return Ok(status);
        }
        Ok(self
            .status_store
            .load(index_type)
            .await?
            .unwrap_or_else(|| IndexBuildStatus::new(index_type)))
    }

    /// Current status of every type.
    pub async fn statuses(&self) -> Result<Vec<IndexBuildStatus>, PipelineError> {
        let mut statuses = Vec::with_capacity(IndexType::ALL.len());
        for index_type in IndexType::ALL {
            statuses.push(self.status(index_type).await?);
        }
        Ok(statuses)
    }

    /// Ask for a full rebuild of the type on its next build.
    ///
    /// Returns the id of the pending rebuild notification, reusing one that
    /// is already queued.
    pub async fn request_rebuild(&self, index_type: IndexType) -> Result<u64, PipelineError> {
        if let Some(existing) = self
            .notifications
            .find_rebuild_notifications(index_type)
            .await?
            .first()
        {
            debug!(index_type = %index_type, id = existing.id, "Rebuild already requested");
            return Ok(existing.id);
        }

        let id = self
            .notifications
            .enqueue(IndexNotification::rebuild(index_type))
            .await?;
        info!(index_type = %index_type, id = id, "Rebuild requested");
        Ok(id)
    }

    /// [`Self::request_rebuild`] by index name.
    pub async fn request_rebuild_by_name(&self, name: &str) -> Result<u64, PipelineError> {
        let index_type = IndexType::from_name(name)?;
        self.request_rebuild(index_type).await
    }

    /// Optimize every registered index that is due, skipping excluded types
    /// and types waiting for a rebuild.
    #[instrument(skip(self))]
    pub async fn optimize_indices(&self) -> Result<Vec<IndexType>, PipelineError> {
        let mut optimized = Vec::new();

        for index_type in self.registered_types() {
            if self.config.optimize_exclusions.contains(&index_type) {
                continue;
            }
            if self.is_rebuild_requested(index_type).await? {
                debug!(index_type = %index_type, "Rebuild pending, skipping optimization");
                continue;
            }
            if !self
                .policy
                .is_optimization_required(&BuildPolicyContext::new(index_type))
            {
                continue;
            }

            match self.engine.optimize(index_type).await {
                Ok(()) => {
                    info!(index_type = %index_type, "Index optimized");
                    optimized.push(index_type);
                }
                Err(e) => warn!(index_type = %index_type, error = %e, "Failed to optimize index"),
            }
        }

        Ok(optimized)
    }
}
