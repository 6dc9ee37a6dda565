//! Per-stage worker pools.

use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::Orchestrator;
use crate::error::FolioResult;
use crate::types::Stage;

/// Fixed-size worker pools, one per stage queue.
///
/// Each worker runs one job at a time; a stage's pool size is its
/// `QueuePolicy::concurrency`. Idle workers sleep until an enqueue wakes
/// them or the poll interval elapses, which also picks up retries whose
/// backoff has expired.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Requeue jobs left running by a previous process, then spawn workers.
    pub async fn start(orchestrator: Arc<Orchestrator>) -> FolioResult<Self> {
        let requeued = orchestrator.queue().recover().await?;
        if requeued > 0 {
            info!(requeued, "Recovered interrupted jobs");
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for stage in Stage::iter() {
            let size = orchestrator.queue().policy(stage).concurrency.max(1);
            for slot in 0..size {
                handles.push(tokio::spawn(run_worker(
                    orchestrator.clone(),
                    stage,
                    slot,
                    cancel.clone(),
                )));
            }
            info!(%stage, workers = size, "Started stage workers");
        }

        Ok(Self { cancel, handles })
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Token that stops every worker when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting jobs and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Worker pools stopped");
    }
}

async fn run_worker(
    orchestrator: Arc<Orchestrator>,
    stage: Stage,
    slot: usize,
    cancel: CancellationToken,
) {
    let wakeup = orchestrator.queue().wakeup(stage);
    let poll = orchestrator.queue().poll_interval();
    debug!(%stage, slot, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match orchestrator.run_next(stage).await {
            // drain before sleeping
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => error!(%stage, slot, error = %e, "Job bookkeeping failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wakeup.notified() => {}
            _ = tokio::time::sleep(poll) => {}
        }
    }

    debug!(%stage, slot, "Worker stopped");
}
