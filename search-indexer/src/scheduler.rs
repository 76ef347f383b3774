//! Periodic build and optimize scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::IndexerConfig;
use crate::IndexingError;
use search_indexer_pipeline::IndexBuildOrchestrator;
use search_indexer_shared::IndexType;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period of each type's build loop.
    pub build_interval: Duration,
    /// Period of the optimize sweep.
    pub optimize_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            build_interval: Duration::from_secs(60),
            optimize_sweep_interval: Duration::from_secs(600),
        }
    }
}

impl From<&IndexerConfig> for SchedulerConfig {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            build_interval: config.build_interval,
            optimize_sweep_interval: config.optimize_sweep_interval,
        }
    }
}

/// Drives the orchestrator on a timer.
///
/// Every registered type gets its own build loop, so a slow type never
/// delays the others. A failed build is logged and retried on the next tick.
pub struct Scheduler {
    orchestrator: Arc<IndexBuildOrchestrator>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<IndexBuildOrchestrator>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            orchestrator,
            config,
            shutdown_tx,
        }
    }

    /// Run until ctrl-c or [`Scheduler::shutdown`].
    ///
    /// Builds in flight finish before the loops stop; publishers are shut
    /// down last.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), IndexingError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.orchestrator.start().await?;

        let mut handles: Vec<JoinHandle<()>> = self
            .orchestrator
            .registered_types()
            .into_iter()
            .map(|index_type| {
                tokio::spawn(build_loop(
                    self.orchestrator.clone(),
                    index_type,
                    self.config.build_interval,
                    self.shutdown_tx.subscribe(),
                ))
            })
            .collect();
        handles.push(tokio::spawn(optimize_loop(
            self.orchestrator.clone(),
            self.config.optimize_sweep_interval,
            self.shutdown_tx.subscribe(),
        )));

        info!(loops = handles.len(), "Scheduler started");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                self.shutdown_tx.send_replace(true);
            }
            _ = stopped(&mut shutdown_rx) => {}
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop panicked");
            }
        }

        self.orchestrator.shutdown().await?;
        info!("Scheduler shutdown complete");
        Ok(())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Resolves once shutdown has been signalled, or the scheduler is gone.
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn build_loop(
    orchestrator: Arc<IndexBuildOrchestrator>,
    index_type: IndexType,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.build_index(index_type).await {
                    Ok(report) => debug!(
                        index_type = %index_type,
                        mode = ?report.mode,
                        submitted = report.documents_submitted,
                        "Scheduled build finished"
                    ),
                    Err(e) => error!(index_type = %index_type, error = %e, "Scheduled build failed"),
                }
            }
            _ = stopped(&mut shutdown_rx) => break,
        }
    }
    debug!(index_type = %index_type, "Build loop stopped");
}

async fn optimize_loop(
    orchestrator: Arc<IndexBuildOrchestrator>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately; nothing is due yet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.optimize_indices().await {
                    Ok(optimized) if !optimized.is_empty() => {
                        info!(index_types = ?optimized, "Optimize sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Optimize sweep failed"),
                }
            }
            _ = stopped(&mut shutdown_rx) => break,
        }
    }
}
