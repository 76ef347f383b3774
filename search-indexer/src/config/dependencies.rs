//! Dependency initialization and wiring for the search indexer.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{IndexerConfig, PublisherKind};
use crate::IndexingError;
use search_indexer_pipeline::{
    BuildPolicy, DocumentPublisher, EngineIndexExistence, FsIndexExistence, IndexBuildOrchestrator,
    IndexBuilder, IndexExistencePredicate, OrchestratorConfig, QueueingDocumentPublisher,
    QueueingPublisherConfig, SimpleDocumentPublisher,
};
use search_indexer_repository::opensearch::IndexConfig;
use search_indexer_repository::{
    BuildStatusStore, InMemoryBuildStatusStore, InMemoryNotificationStore, JsonFileBuildStatusStore,
    JsonFileNotificationStore, NotificationStore, OpenSearchClient, SearchEngineClient,
};
use search_indexer_shared::IndexType;

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub engine: Arc<dyn SearchEngineClient>,
    pub notifications: Arc<dyn NotificationStore>,
    pub status_store: Arc<dyn BuildStatusStore>,
    pub existence: Arc<dyn IndexExistencePredicate>,
    pub policy: Arc<BuildPolicy>,
    publisher_kind: PublisherKind,
    queue: QueueingPublisherConfig,
    orchestrator: OrchestratorConfig,
}

impl Dependencies {
    /// Initialize all dependencies from the configuration.
    ///
    /// No network traffic happens here; see [`Dependencies::verify`].
    pub async fn new(config: &IndexerConfig) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %config.opensearch_url,
            index_prefix = %config.index_prefix,
            "Initializing dependencies"
        );

        // Initialize OpenSearch client
        let engine: Arc<dyn SearchEngineClient> = Arc::new(
            OpenSearchClient::new(&config.opensearch_url, IndexConfig::new(&config.index_prefix))
                .await
                .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?,
        );

        let status_store: Arc<dyn BuildStatusStore> = match &config.status_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                info!(dir = %dir.display(), "Persisting build status as JSON");
                Arc::new(JsonFileBuildStatusStore::new(dir.clone()))
            }
            None => {
                warn!("STATUS_DIR not set, build status is kept in memory only");
                Arc::new(InMemoryBuildStatusStore::new())
            }
        };

        let notifications: Arc<dyn NotificationStore> = match &config.notification_dir {
            Some(dir) => Arc::new(JsonFileNotificationStore::open(dir.clone()).await?),
            None => {
                warn!("NOTIFICATION_DIR not set, pending notifications are lost on restart");
                Arc::new(InMemoryNotificationStore::new())
            }
        };

        let existence: Arc<dyn IndexExistencePredicate> = match &config.index_data_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Checking index existence on disk");
                Arc::new(FsIndexExistence::under(dir))
            }
            None => Arc::new(EngineIndexExistence::new(engine.clone())),
        };

        Ok(Self {
            engine,
            notifications,
            status_store,
            existence,
            policy: Arc::new(BuildPolicy::new(config.policy.clone())),
            publisher_kind: config.publisher_kind,
            queue: config.queue.clone(),
            orchestrator: config.orchestrator.clone(),
        })
    }

    /// Replace the notification store, e.g. with one shared with the
    /// producers of the embedding application.
    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationStore>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Verify OpenSearch is reachable and healthy.
    pub async fn verify(&self) -> Result<(), IndexingError> {
        let healthy = self
            .engine
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");
        Ok(())
    }

    /// Create the configured publisher variant for one index type.
    pub fn publisher(&self, index_type: IndexType) -> Arc<dyn DocumentPublisher> {
        match self.publisher_kind {
            PublisherKind::Queueing => Arc::new(QueueingDocumentPublisher::with_config(
                index_type,
                self.engine.clone(),
                self.queue.clone(),
            )),
            PublisherKind::Simple => Arc::new(SimpleDocumentPublisher::new(
                index_type,
                self.engine.clone(),
                self.policy.clone(),
            )),
        }
    }

    /// Create the orchestrator, registering a builder for every type
    /// `builders` accepts.
    pub fn into_orchestrator<F>(self, mut builders: F) -> Result<IndexBuildOrchestrator, IndexingError>
    where
        F: FnMut(IndexType, Arc<dyn DocumentPublisher>) -> Option<Arc<dyn IndexBuilder>>,
    {
        let mut orchestrator = IndexBuildOrchestrator::new(
            self.engine.clone(),
            self.notifications.clone(),
            self.status_store.clone(),
            self.existence.clone(),
            self.policy.clone(),
            self.orchestrator.clone(),
        );

        for index_type in IndexType::ALL {
            let publisher = self.publisher(index_type);
            if let Some(builder) = builders(index_type, publisher.clone()) {
                orchestrator.register(builder, publisher)?;
            }
        }

        let registered = orchestrator.registered_types();
        if registered.is_empty() {
            return Err(IndexingError::config("No index builders registered"));
        }
        info!(index_types = ?registered, publisher_kind = ?self.publisher_kind, "Orchestrator created");

        Ok(orchestrator)
    }
}
