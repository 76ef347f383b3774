//! Simple document publisher.
//!
//! Buffers documents in the caller's task and lets the build policy decide
//! when to send them and when to commit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::policy::{BuildPolicy, BuildPolicyContext};
use crate::publisher::DocumentPublisher;
use search_indexer_repository::SearchEngineClient;
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// Cache that must be cleared before each bulk send to bound memory.
pub trait SessionCache: Send + Sync {
    fn clear(&self);
}

/// Session cache that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionCache;

impl SessionCache for NoopSessionCache {
    fn clear(&self) {}
}

struct BufferState {
    buffer: Vec<SearchDocument>,
    context: BuildPolicyContext,
}

/// Publisher that sends and commits on the policy's cadence.
pub struct SimpleDocumentPublisher {
    index_type: IndexType,
    engine: Arc<dyn SearchEngineClient>,
    policy: Arc<BuildPolicy>,
    session_cache: Arc<dyn SessionCache>,
    state: Mutex<BufferState>,
    buffered: AtomicUsize,
}

impl SimpleDocumentPublisher {
    pub fn new(
        index_type: IndexType,
        engine: Arc<dyn SearchEngineClient>,
        policy: Arc<BuildPolicy>,
    ) -> Self {
        Self::with_session_cache(index_type, engine, policy, Arc::new(NoopSessionCache))
    }

    pub fn with_session_cache(
        index_type: IndexType,
        engine: Arc<dyn SearchEngineClient>,
        policy: Arc<BuildPolicy>,
        session_cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            index_type,
            engine,
            policy,
            session_cache,
            state: Mutex::new(BufferState {
                buffer: Vec::new(),
                context: BuildPolicyContext::new(index_type),
            }),
            buffered: AtomicUsize::new(0),
        }
    }

    /// Counters seen by the policy so far.
    pub async fn context(&self) -> BuildPolicyContext {
        self.state.lock().await.context
    }

    async fn send_buffer(&self, state: &mut BufferState) -> Result<(), PipelineError> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        self.session_cache.clear();

        // the buffer is kept until the engine accepts it
        self.engine.add_documents(self.index_type, &state.buffer).await?;
        let count = state.buffer.len();
        state.buffer.clear();
        self.buffered.store(0, Ordering::SeqCst);

        debug!(index_type = %self.index_type, count = count, "Sent buffered documents");
        Ok(())
    }

    async fn commit_locked(&self, state: &mut BufferState) -> Result<(), PipelineError> {
        self.send_buffer(state).await?;
        self.engine.commit(self.index_type).await?;
        debug!(
            index_type = %self.index_type,
            operations = state.context.operations_count,
            "Committed"
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentPublisher for SimpleDocumentPublisher {
    fn index_type(&self) -> IndexType {
        self.index_type
    }

    async fn start(&self) -> Result<(), PipelineError> {
        info!(index_type = %self.index_type, "Simple publisher started");
        Ok(())
    }

    async fn add_update(&self, document: SearchDocument) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        state.buffer.push(document);
        self.buffered.store(state.buffer.len(), Ordering::SeqCst);
        state.context.documents_added += 1;
        state.context.operations_count += 1;

        if self.policy.is_add_documents_required(&state.context) {
            self.send_buffer(&mut state).await?;
        }
        if self.policy.is_commit_required(&state.context) {
            self.commit_locked(&mut state).await?;
        }
        Ok(())
    }

    async fn delete_document(&self, uid: Uid) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        self.engine.delete_document(self.index_type, uid).await?;
        state.context.operations_count += 1;

        if self.policy.is_commit_required(&state.context) {
            self.commit_locked(&mut state).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        self.send_buffer(&mut state).await
    }

    async fn commit(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        self.commit_locked(&mut state).await
    }

    async fn shutdown(&self) -> Result<(), PipelineError> {
        self.flush().await
    }

    fn is_busy(&self) -> bool {
        self.buffered.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BuildPolicyConfig;
    use crate::test_support::{EngineOp, RecordingEngine};

    struct CountingCache {
        clears: AtomicUsize,
    }

    impl SessionCache for CountingCache {
        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy(max_docs: u64, max_ops: u64) -> Arc<BuildPolicy> {
        Arc::new(BuildPolicy::new(BuildPolicyConfig {
            max_docs_before_add: max_docs,
            max_operations_before_commit: max_ops,
            ..Default::default()
        }))
    }

    fn commits(ops: &[EngineOp]) -> usize {
        ops.iter().filter(|op| matches!(op, EngineOp::Commit(_))).count()
    }

    #[tokio::test]
    async fn test_commits_every_third_operation() {
        let engine = Arc::new(RecordingEngine::new());
        let publisher = SimpleDocumentPublisher::new(IndexType::Sku, engine.clone(), policy(1, 3));

        let mut commits_after = Vec::new();
        for uid in 1..=10u64 {
            if uid % 4 == 0 {
                publisher.delete_document(uid).await.unwrap();
            } else {
                publisher.add_update(SearchDocument::new(uid)).await.unwrap();
            }
            if commits(&engine.ops()) > commits_after.len() {
                commits_after.push(uid);
            }
        }

        assert_eq!(commits_after, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn test_documents_sent_in_batches() {
        let engine = Arc::new(RecordingEngine::new());
        let cache = Arc::new(CountingCache {
            clears: AtomicUsize::new(0),
        });
        let publisher = SimpleDocumentPublisher::with_session_cache(
            IndexType::Product,
            engine.clone(),
            policy(2, 100),
            cache.clone(),
        );

        publisher.add_update(SearchDocument::new(1)).await.unwrap();
        assert!(publisher.is_busy());
        assert!(engine.ops().is_empty());

        publisher.add_update(SearchDocument::new(2)).await.unwrap();
        publisher.add_update(SearchDocument::new(3)).await.unwrap();

        assert_eq!(engine.ops(), vec![EngineOp::BulkAdd(IndexType::Product, vec![1, 2])]);
        assert_eq!(cache.clears.load(Ordering::SeqCst), 1);
        assert!(publisher.is_busy());

        publisher.flush().await.unwrap();
        assert!(!publisher.is_busy());
        assert_eq!(cache.clears.load(Ordering::SeqCst), 2);
        assert_eq!(engine.document_uids(IndexType::Product), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_commit_sends_buffer_first() {
        let engine = Arc::new(RecordingEngine::new());
        let publisher = SimpleDocumentPublisher::new(IndexType::Category, engine.clone(), policy(10, 100));

        publisher.add_update(SearchDocument::new(7)).await.unwrap();
        publisher.commit().await.unwrap();

        assert_eq!(
            engine.ops(),
            vec![
                EngineOp::BulkAdd(IndexType::Category, vec![7]),
                EngineOp::Commit(IndexType::Category),
            ]
        );
        let context = publisher.context().await;
        assert_eq!(context.documents_added, 1);
        assert_eq!(context.operations_count, 1);
    }

    #[tokio::test]
    async fn test_delete_is_immediate() {
        let engine = Arc::new(RecordingEngine::new());
        let publisher = SimpleDocumentPublisher::new(IndexType::Customer, engine.clone(), policy(10, 100));

        publisher.delete_document(4).await.unwrap();

        assert_eq!(engine.ops(), vec![EngineOp::Delete(IndexType::Customer, 4)]);
        assert!(!publisher.is_busy());
    }

    #[tokio::test]
    async fn test_shutdown_flushes() {
        let engine = Arc::new(RecordingEngine::new());
        let publisher = SimpleDocumentPublisher::new(IndexType::Promotion, engine.clone(), policy(10, 100));
        publisher.start().await.unwrap();
        publisher.add_update(SearchDocument::new(1)).await.unwrap();

        publisher.shutdown().await.unwrap();

        assert_eq!(engine.ops(), vec![EngineOp::BulkAdd(IndexType::Promotion, vec![1])]);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_documents_buffered() {
        let engine = Arc::new(RecordingEngine::new());
        let publisher = SimpleDocumentPublisher::new(IndexType::Product, engine.clone(), policy(2, 100));

        publisher.add_update(SearchDocument::new(1)).await.unwrap();
        engine.set_fail_bulk_add(true);
        let err = publisher.add_update(SearchDocument::new(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::SearchError(_)));
        assert!(publisher.is_busy());

        assert!(publisher.commit().await.is_err());
        assert!(engine.ops().is_empty());

        engine.set_fail_bulk_add(false);
        publisher.commit().await.unwrap();

        assert_eq!(
            engine.ops(),
            vec![
                EngineOp::BulkAdd(IndexType::Product, vec![1, 2]),
                EngineOp::Commit(IndexType::Product),
            ]
        );
        assert!(!publisher.is_busy());
    }
}
