//! Queueing document publisher.
//!
//! Commands go through a bounded channel to a single background worker, so a
//! slow engine pushes back on producers instead of growing memory.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use crate::publisher::{DocumentPublisher, PublishCommand};
use search_indexer_repository::SearchEngineClient;
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// Configuration for the queueing publisher.
#[derive(Debug, Clone)]
pub struct QueueingPublisherConfig {
    /// Bound of the command queue. Producers wait when it is full.
    pub queue_capacity: usize,
    /// Extra commands the worker takes without waiting after each blocking
    /// receive.
    pub queue_drain_size: usize,
}

impl Default for QueueingPublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            queue_drain_size: 100,
        }
    }
}

/// Worker counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    batches: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl PublisherStats {
    /// Worker iterations, i.e. blocking receives that yielded a batch.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }

    /// Commands applied successfully (the shutdown sentinel excluded).
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    /// Commands whose application failed and was skipped.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Commands accepted but not yet consumed by the worker.
    pending: usize,
    worker_alive: bool,
}

/// State shared between the producers and the worker.
struct Shared {
    state: Mutex<QueueState>,
    idle: Notify,
    stats: PublisherStats,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, consumed: usize) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(consumed);
        if state.pending == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Pending slot taken by a producer; given back if the send never completes.
struct PendingReservation<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for PendingReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release(1);
        }
    }
}

/// Publisher backed by a bounded queue and one worker task.
///
/// Commands from one producer are applied in submission order. A failing
/// command is logged and skipped; it never stops the stream.
pub struct QueueingDocumentPublisher {
    index_type: IndexType,
    engine: Arc<dyn SearchEngineClient>,
    config: QueueingPublisherConfig,
    sender: mpsc::Sender<PublishCommand>,
    receiver: Mutex<Option<mpsc::Receiver<PublishCommand>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    shared: Arc<Shared>,
}

impl QueueingDocumentPublisher {
    /// Create a publisher with default configuration.
    pub fn new(index_type: IndexType, engine: Arc<dyn SearchEngineClient>) -> Self {
        Self::with_config(index_type, engine, QueueingPublisherConfig::default())
    }

    /// Create a publisher with custom configuration.
    pub fn with_config(
        index_type: IndexType,
        engine: Arc<dyn SearchEngineClient>,
        config: QueueingPublisherConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            index_type,
            engine,
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                stats: PublisherStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.shared.stats
    }

    fn is_started(&self) -> bool {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    async fn enqueue(&self, command: PublishCommand) -> Result<(), PipelineError> {
        self.shared.lock().pending += 1;
        let mut reservation = PendingReservation {
            shared: &self.shared,
            armed: true,
        };

        if self.sender.send(command).await.is_err() {
            return Err(PipelineError::PublisherClosed(self.index_type));
        }
        reservation.armed = false;
        Ok(())
    }

    async fn enqueue_open(&self, command: PublishCommand) -> Result<(), PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PipelineError::PublisherClosed(self.index_type));
        }
        self.enqueue(command).await
    }

    /// Wait until every accepted command has been consumed by the worker.
    async fn wait_until_drained(&self) -> Result<(), PipelineError> {
        loop {
            let notified = self.shared.idle.notified();
            {
                let state = self.shared.lock();
                if !state.worker_alive {
                    if self.is_started() {
                        return Err(if self.closed.load(Ordering::SeqCst) {
                            PipelineError::PublisherClosed(self.index_type)
                        } else {
                            PipelineError::Interrupted
                        });
                    }
                    if state.pending > 0 {
                        return Err(PipelineError::config(format!(
                            "Publisher for {} has queued work but was never started",
                            self.index_type
                        )));
                    }
                    return Ok(());
                }
                if state.pending == 0 {
                    return Ok(());
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DocumentPublisher for QueueingDocumentPublisher {
    fn index_type(&self) -> IndexType {
        self.index_type
    }

    async fn start(&self) -> Result<(), PipelineError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            warn!(index_type = %self.index_type, "Publisher already started");
            return Ok(());
        };

        self.shared.lock().worker_alive = true;
        let handle = tokio::spawn(run_worker(
            self.index_type,
            self.engine.clone(),
            receiver,
            self.shared.clone(),
            self.config.queue_drain_size,
        ));
        *self.worker.lock().await = Some(handle);

        info!(
            index_type = %self.index_type,
            capacity = self.config.queue_capacity,
            drain_size = self.config.queue_drain_size,
            "Queueing publisher started"
        );
        Ok(())
    }

    async fn add_update(&self, document: SearchDocument) -> Result<(), PipelineError> {
        self.enqueue_open(PublishCommand::AddUpdate(document)).await
    }

    async fn delete_document(&self, uid: Uid) -> Result<(), PipelineError> {
        self.enqueue_open(PublishCommand::Delete(uid)).await
    }

    /// Periodic commits are not supported by this variant; nothing is
    /// buffered outside the queue.
    async fn flush(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), PipelineError> {
        self.wait_until_drained().await?;
        self.engine.commit(self.index_type).await?;
        debug!(index_type = %self.index_type, "Publisher committed");
        Ok(())
    }

    #[instrument(skip(self), fields(index_type = %self.index_type))]
    async fn shutdown(&self) -> Result<(), PipelineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.is_started() {
            // queued commands still deserve delivery
            self.start().await?;
        }

        if self.enqueue(PublishCommand::Shutdown).await.is_err() {
            debug!("Publisher worker already stopped");
        }

        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Publisher worker panicked");
                return Err(PipelineError::Interrupted);
            }
        }

        info!(
            applied = self.shared.stats.applied(),
            failed = self.shared.stats.failed(),
            "Queueing publisher shut down"
        );
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.shared.lock().pending > 0
    }
}

/// Worker loop: wait for one command, opportunistically take up to
/// `drain_size` more, apply them in order.
async fn run_worker(
    index_type: IndexType,
    engine: Arc<dyn SearchEngineClient>,
    mut receiver: mpsc::Receiver<PublishCommand>,
    shared: Arc<Shared>,
    drain_size: usize,
) {
    let mut batch: Vec<PublishCommand> = Vec::with_capacity(drain_size + 1);

    loop {
        let Some(first) = receiver.recv().await else {
            info!(index_type = %index_type, "Publish queue closed");
            break;
        };
        batch.push(first);
        while batch.len() <= drain_size {
            match receiver.try_recv() {
                Ok(command) => batch.push(command),
                Err(_) => break,
            }
        }

        shared.stats.batches.fetch_add(1, Ordering::SeqCst);
        let consumed = batch.len();
        let mut stop = false;

        for command in batch.drain(..) {
            if stop {
                warn!(index_type = %index_type, command = ?command, "Discarding command after stop");
                continue;
            }
            if command.is_shutdown() {
                debug!(index_type = %index_type, "Shutdown command received");
                stop = true;
                continue;
            }
            match command.apply(engine.as_ref(), index_type).await {
                Ok(()) => {
                    shared.stats.applied.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) if e.is_interrupted() => {
                    warn!(index_type = %index_type, "Publisher interrupted, stopping");
                    stop = true;
                }
                Err(e) => {
                    shared.stats.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        index_type = %index_type,
                        command = ?command,
                        error = %e,
                        "Failed to apply publish command"
                    );
                }
            }
        }

        shared.release(consumed);
        if stop {
            break;
        }
    }

    receiver.close();
    let mut discarded = 0;
    while receiver.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        warn!(index_type = %index_type, discarded = discarded, "Commands left undelivered");
    }

    let mut state = shared.lock();
    state.pending = state.pending.saturating_sub(discarded);
    state.worker_alive = false;
    drop(state);
    shared.idle.notify_waiters();

    debug!(index_type = %index_type, "Publisher worker stopped");
}
