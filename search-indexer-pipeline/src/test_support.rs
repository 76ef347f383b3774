//! Hand-written collaborators shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::builder::{IndexBuilder, PipelineStatus};
use crate::errors::PipelineError;
use crate::publisher::DocumentPublisher;
use search_indexer_repository::{NotificationStore, SearchEngineClient, SearchError};
use search_indexer_shared::{IndexNotification, IndexType, SearchDocument, Uid};

/// One call observed by [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Add(IndexType, Uid),
    BulkAdd(IndexType, Vec<Uid>),
    Delete(IndexType, Uid),
    DeleteAll(IndexType),
    Commit(IndexType),
    Optimize(IndexType),
    FindUids(IndexType, String),
}

impl EngineOp {
    /// Whether the call changes index contents or visibility.
    pub fn is_write(&self) -> bool {
        !matches!(self, EngineOp::FindUids(..))
    }
}

/// In-memory engine that records every call.
pub struct RecordingEngine {
    ops: Mutex<Vec<EngineOp>>,
    documents: Mutex<HashMap<IndexType, BTreeMap<Uid, SearchDocument>>>,
    failing_adds: Mutex<HashSet<Uid>>,
    interrupting_adds: Mutex<HashSet<Uid>>,
    failing_optimize: Mutex<HashSet<IndexType>>,
    query_results: Mutex<HashMap<String, Vec<Uid>>>,
    fail_delete_all: AtomicBool,
    fail_bulk_add: AtomicBool,
    index_exists: AtomicBool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            documents: Mutex::new(HashMap::new()),
            failing_adds: Mutex::new(HashSet::new()),
            interrupting_adds: Mutex::new(HashSet::new()),
            failing_optimize: Mutex::new(HashSet::new()),
            query_results: Mutex::new(HashMap::new()),
            fail_delete_all: AtomicBool::new(false),
            fail_bulk_add: AtomicBool::new(false),
            index_exists: AtomicBool::new(true),
        }
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn write_ops(&self) -> Vec<EngineOp> {
        self.ops().into_iter().filter(EngineOp::is_write).collect()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Uids currently held for the type, ascending.
    pub fn document_uids(&self, index_type: IndexType) -> Vec<Uid> {
        self.documents
            .lock()
            .unwrap()
            .get(&index_type)
            .map(|docs| docs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn fail_add_for(&self, uid: Uid) {
        self.failing_adds.lock().unwrap().insert(uid);
    }

    pub fn interrupt_add_for(&self, uid: Uid) {
        self.interrupting_adds.lock().unwrap().insert(uid);
    }

    pub fn fail_optimize_for(&self, index_type: IndexType) {
        self.failing_optimize.lock().unwrap().insert(index_type);
    }

    pub fn set_fail_delete_all(&self, fail: bool) {
        self.fail_delete_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_bulk_add(&self, fail: bool) {
        self.fail_bulk_add.store(fail, Ordering::SeqCst);
    }

    pub fn set_index_exists(&self, exists: bool) {
        self.index_exists.store(exists, Ordering::SeqCst);
    }

    pub fn set_query_result(&self, query: &str, uids: Vec<Uid>) {
        self.query_results.lock().unwrap().insert(query.to_string(), uids);
    }

    fn record(&self, op: EngineOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn store(&self, index_type: IndexType, document: &SearchDocument) {
        self.documents
            .lock()
            .unwrap()
            .entry(index_type)
            .or_default()
            .insert(document.uid, document.clone());
    }
}

#[async_trait]
impl SearchEngineClient for RecordingEngine {
    async fn add_or_update(
        &self,
        index_type: IndexType,
        document: &SearchDocument,
    ) -> Result<(), SearchError> {
        if self.interrupting_adds.lock().unwrap().contains(&document.uid) {
            return Err(SearchError::Interrupted);
        }
        if self.failing_adds.lock().unwrap().contains(&document.uid) {
            return Err(SearchError::index(format!("rejected {}", document.uid)));
        }
        self.store(index_type, document);
        self.record(EngineOp::Add(index_type, document.uid));
        Ok(())
    }

    async fn add_documents(
        &self,
        index_type: IndexType,
        documents: &[SearchDocument],
    ) -> Result<(), SearchError> {
        if self.fail_bulk_add.load(Ordering::SeqCst) {
            return Err(SearchError::bulk_index("bulk request rejected"));
        }
        for document in documents {
            self.store(index_type, document);
        }
        self.record(EngineOp::BulkAdd(
            index_type,
            documents.iter().map(|d| d.uid).collect(),
        ));
        Ok(())
    }

    async fn delete_document(&self, index_type: IndexType, uid: Uid) -> Result<(), SearchError> {
        if let Some(docs) = self.documents.lock().unwrap().get_mut(&index_type) {
            docs.remove(&uid);
        }
        self.record(EngineOp::Delete(index_type, uid));
        Ok(())
    }

    async fn delete_all(&self, index_type: IndexType) -> Result<(), SearchError> {
        if self.fail_delete_all.load(Ordering::SeqCst) {
            return Err(SearchError::delete("delete_all refused"));
        }
        self.documents.lock().unwrap().remove(&index_type);
        self.record(EngineOp::DeleteAll(index_type));
        Ok(())
    }

    async fn commit(&self, index_type: IndexType) -> Result<(), SearchError> {
        self.record(EngineOp::Commit(index_type));
        Ok(())
    }

    async fn optimize(&self, index_type: IndexType) -> Result<(), SearchError> {
        if self.failing_optimize.lock().unwrap().contains(&index_type) {
            return Err(SearchError::optimize("merge failed"));
        }
        self.record(EngineOp::Optimize(index_type));
        Ok(())
    }

    async fn find_uids(&self, index_type: IndexType, raw_query: &str) -> Result<Vec<Uid>, SearchError> {
        self.record(EngineOp::FindUids(index_type, raw_query.to_string()));
        Ok(self
            .query_results
            .lock()
            .unwrap()
            .get(raw_query)
            .cloned()
            .unwrap_or_default())
    }

    async fn index_exists(&self, _index_type: IndexType) -> Result<bool, SearchError> {
        Ok(self.index_exists.load(Ordering::SeqCst))
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

/// How [`FakeBuilder::submit`] reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Publish, then mark the returned status completed.
    Complete,
    /// Publish without returning a status.
    FireAndForget,
    /// Publish nothing and abandon the returned status.
    Abandon,
}

/// Builder that turns each uid into an empty document.
pub struct FakeBuilder {
    index_type: IndexType,
    publisher: Arc<dyn DocumentPublisher>,
    mode: Mutex<SubmitMode>,
    all_uids: Mutex<Vec<Uid>>,
    page_size: Option<usize>,
    added: Mutex<Vec<Uid>>,
    deleted: Mutex<Vec<Uid>>,
    related: Mutex<HashMap<Uid, Vec<Uid>>>,
    follow_ups: Mutex<Option<(Arc<dyn NotificationStore>, VecDeque<IndexNotification>)>>,
    pub submitted: Mutex<Vec<Vec<Uid>>>,
    pub delta_since: Mutex<Vec<DateTime<Utc>>>,
    pub updating_calls: AtomicUsize,
    pub updated_calls: AtomicUsize,
    pub build_complete_calls: AtomicUsize,
}

impl FakeBuilder {
    pub fn new(index_type: IndexType, publisher: Arc<dyn DocumentPublisher>) -> Self {
        Self {
            index_type,
            publisher,
            mode: Mutex::new(SubmitMode::Complete),
            all_uids: Mutex::new(Vec::new()),
            page_size: None,
            added: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            related: Mutex::new(HashMap::new()),
            follow_ups: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            delta_since: Mutex::new(Vec::new()),
            updating_calls: AtomicUsize::new(0),
            updated_calls: AtomicUsize::new(0),
            build_complete_calls: AtomicUsize::new(0),
        }
    }

    pub fn paginated(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn set_mode(&self, mode: SubmitMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_all_uids(&self, uids: Vec<Uid>) {
        *self.all_uids.lock().unwrap() = uids;
    }

    pub fn set_added(&self, uids: Vec<Uid>) {
        *self.added.lock().unwrap() = uids;
    }

    pub fn set_deleted(&self, uids: Vec<Uid>) {
        *self.deleted.lock().unwrap() = uids;
    }

    pub fn set_related(&self, entity_uid: Uid, uids: Vec<Uid>) {
        self.related.lock().unwrap().insert(entity_uid, uids);
    }

    /// Enqueue one of `notifications` into `store` on each submit, simulating
    /// changes that land while a build runs.
    pub fn enqueue_on_submit(
        &self,
        store: Arc<dyn NotificationStore>,
        notifications: Vec<IndexNotification>,
    ) {
        *self.follow_ups.lock().unwrap() = Some((store, notifications.into()));
    }

    /// Every uid submitted so far, sorted.
    pub fn submitted_uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.submitted.lock().unwrap().iter().flatten().copied().collect();
        uids.sort_unstable();
        uids
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl IndexBuilder for FakeBuilder {
    fn index_type(&self) -> IndexType {
        self.index_type
    }

    async fn find_all_uids(&self) -> Result<Vec<Uid>, PipelineError> {
        Ok(self.all_uids.lock().unwrap().clone())
    }

    fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    async fn find_indexable_uids_paginated(&self, page: usize) -> Result<Vec<Uid>, PipelineError> {
        let size = self.page_size.unwrap_or(usize::MAX).max(1);
        let all = self.all_uids.lock().unwrap().clone();
        Ok(all.chunks(size).nth(page).map(<[Uid]>::to_vec).unwrap_or_default())
    }

    async fn find_added_or_modified_uids(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Uid>, PipelineError> {
        self.delta_since.lock().unwrap().push(since);
        Ok(self.added.lock().unwrap().clone())
    }

    async fn find_deleted_uids(&self, _since: DateTime<Utc>) -> Result<Vec<Uid>, PipelineError> {
        Ok(self.deleted.lock().unwrap().clone())
    }

    async fn find_uids_by_notification(
        &self,
        notification: &IndexNotification,
    ) -> Result<Vec<Uid>, PipelineError> {
        let uid = notification
            .affected_uid
            .ok_or_else(|| PipelineError::builder("notification without uid"))?;
        Ok(self.related.lock().unwrap().get(&uid).cloned().unwrap_or_default())
    }

    async fn submit(&self, uids: Vec<Uid>) -> Result<Option<PipelineStatus>, PipelineError> {
        self.submitted.lock().unwrap().push(uids.clone());
        let follow_up = self
            .follow_ups
            .lock()
            .unwrap()
            .as_mut()
            .and_then(|(store, queue)| queue.pop_front().map(|n| (store.clone(), n)));
        if let Some((store, notification)) = follow_up {
            store.enqueue(notification).await?;
        }
        let mode = *self.mode.lock().unwrap();

        let status = PipelineStatus::new();
        let worker_status = status.clone();
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            if mode == SubmitMode::Abandon {
                worker_status.abandon();
                return;
            }
            for uid in uids {
                if publisher.add_update(SearchDocument::new(uid)).await.is_err() {
                    worker_status.abandon();
                    return;
                }
            }
            worker_status.mark_completed();
        });

        match mode {
            SubmitMode::FireAndForget => Ok(None),
            _ => Ok(Some(status)),
        }
    }

    async fn on_index_updating(&self, _engine: &dyn SearchEngineClient) -> Result<(), PipelineError> {
        self.updating_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_index_updated(&self, _engine: &dyn SearchEngineClient) -> Result<(), PipelineError> {
        self.updated_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_build_complete(&self) {
        self.build_complete_calls.fetch_add(1, Ordering::SeqCst);
    }
}
