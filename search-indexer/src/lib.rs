//! # Search Indexer
//!
//! Main library for the search index build service.
//!
//! This crate provides the configuration, dependency wiring, tracing setup
//! and the scheduler that drives periodic builds and the optimize sweep.
//! Domain crates supply the index builders and call [`run`], or build an
//! [`Indexer`] to keep handles on the notification store and orchestrator.

pub mod config;
pub mod scheduler;
pub mod telemetry;

pub use config::{Dependencies, IndexerConfig, LogFormat, PublisherKind};
pub use scheduler::{Scheduler, SchedulerConfig};

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use search_indexer_pipeline::{DocumentPublisher, IndexBuildOrchestrator, IndexBuilder};
use search_indexer_repository::NotificationStore;
use search_indexer_shared::IndexType;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_indexer_pipeline::PipelineError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_indexer_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// A wired service: the orchestrator, its notification store and the
/// scheduler that drives it.
///
/// Producers enqueue through [`Indexer::notifications`]; operators reach
/// `request_rebuild`, `status` and friends through [`Indexer::orchestrator`].
pub struct Indexer {
    orchestrator: Arc<IndexBuildOrchestrator>,
    notifications: Arc<dyn NotificationStore>,
    scheduler: Scheduler,
}

impl Indexer {
    /// Wire the service from configuration and already built dependencies.
    ///
    /// `builders` is asked once per index type for the builder of that type,
    /// handed the publisher it must publish through; types it declines are
    /// not indexed.
    pub fn new<F>(config: &IndexerConfig, dependencies: Dependencies, builders: F) -> Result<Self, IndexingError>
    where
        F: FnMut(IndexType, Arc<dyn DocumentPublisher>) -> Option<Arc<dyn IndexBuilder>>,
    {
        let notifications = dependencies.notifications.clone();
        let orchestrator = Arc::new(dependencies.into_orchestrator(builders)?);
        let scheduler = Scheduler::new(orchestrator.clone(), SchedulerConfig::from(config));

        Ok(Self {
            orchestrator,
            notifications,
            scheduler,
        })
    }

    /// Read the environment, install tracing and verify the engine.
    pub async fn from_env<F>(builders: F) -> Result<Self, IndexingError>
    where
        F: FnMut(IndexType, Arc<dyn DocumentPublisher>) -> Option<Arc<dyn IndexBuilder>>,
    {
        let config = IndexerConfig::from_env()?;
        telemetry::init_tracing(config.log_format)?;

        let dependencies = Dependencies::new(&config).await?;
        dependencies.verify().await?;

        Self::new(&config, dependencies, builders)
    }

    pub fn orchestrator(&self) -> Arc<IndexBuildOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn notifications(&self) -> Arc<dyn NotificationStore> {
        self.notifications.clone()
    }

    /// Run until ctrl-c or [`Indexer::shutdown`].
    pub async fn run(&self) -> Result<(), IndexingError> {
        info!(index_types = ?self.orchestrator.registered_types(), "Search indexer starting");
        self.scheduler.run().await
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

/// Run the service until ctrl-c.
///
/// Applications that enqueue notifications or request rebuilds build an
/// [`Indexer`] instead and keep its handles.
pub async fn run<F>(builders: F) -> Result<(), IndexingError>
where
    F: FnMut(IndexType, Arc<dyn DocumentPublisher>) -> Option<Arc<dyn IndexBuilder>>,
{
    Indexer::from_env(builders).await?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use search_indexer_pipeline::{PipelineError, PipelineStatus};
    use search_indexer_shared::{IndexNotification, Uid, UpdateType};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Mock builder with an empty system of record.
    struct EmptyBuilder {
        index_type: IndexType,
    }

    #[async_trait]
    impl IndexBuilder for EmptyBuilder {
        fn index_type(&self) -> IndexType {
            self.index_type
        }

        async fn find_all_uids(&self) -> Result<Vec<Uid>, PipelineError> {
            Ok(Vec::new())
        }

        async fn find_added_or_modified_uids(&self, _: DateTime<Utc>) -> Result<Vec<Uid>, PipelineError> {
            Ok(Vec::new())
        }

        async fn find_deleted_uids(&self, _: DateTime<Utc>) -> Result<Vec<Uid>, PipelineError> {
            Ok(Vec::new())
        }

        async fn find_uids_by_notification(&self, _: &IndexNotification) -> Result<Vec<Uid>, PipelineError> {
            Ok(Vec::new())
        }

        async fn submit(&self, _: Vec<Uid>) -> Result<Option<PipelineStatus>, PipelineError> {
            let status = PipelineStatus::new();
            status.mark_completed();
            Ok(Some(status))
        }
    }

    fn config(dir: &TempDir) -> IndexerConfig {
        let vars: HashMap<String, String> =
            [("STATUS_DIR".to_string(), dir.path().display().to_string())].into();
        IndexerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    async fn build_indexer(config: &IndexerConfig) -> Indexer {
        let dependencies = Dependencies::new(config).await.unwrap();
        Indexer::new(config, dependencies, |index_type, _| {
            (index_type == IndexType::Product)
                .then(|| Arc::new(EmptyBuilder { index_type }) as Arc<dyn IndexBuilder>)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_handles_reach_notifications_and_rebuild_requests() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let indexer = build_indexer(&config).await;

        indexer
            .notifications()
            .enqueue(IndexNotification::single_unit(IndexType::Product, UpdateType::Update, 3))
            .await
            .unwrap();
        let rebuild = indexer
            .orchestrator()
            .request_rebuild(IndexType::Product)
            .await
            .unwrap();
        assert_eq!(indexer.orchestrator().registered_types(), vec![IndexType::Product]);
        drop(indexer);

        let restarted = build_indexer(&config).await;
        let pending = restarted
            .notifications()
            .find_new_notifications(IndexType::Product)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].id, rebuild);
    }
}
