//! Durable per-stage job queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::Utc;
use strum::IntoEnumIterator;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{QueueConfig, QueuePolicy};
use crate::error::{FolioError, FolioResult};
use crate::traits::JobStore;
use crate::types::{EnqueueOutcome, JobRecord, Stage, StagePayload};

/// Job queues for every stage over one [`JobStore`].
///
/// Enqueue is idempotent per `(stage, document)`; idle workers are woken
/// through a per-stage [`Notify`] and otherwise poll.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    wakeups: HashMap<Stage, Arc<Notify>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        let wakeups = Stage::iter().map(|s| (s, Arc::new(Notify::new()))).collect();
        Self {
            store,
            config,
            wakeups,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn policy(&self, stage: Stage) -> &QueuePolicy {
        match stage {
            Stage::Segmentation => &self.config.segmentation,
            Stage::Analysis => &self.config.analysis,
            Stage::Discovery => &self.config.discovery,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(10))
    }

    /// Handle idle workers of `stage` wait on.
    pub fn wakeup(&self, stage: Stage) -> Arc<Notify> {
        self.wakeups
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Arc::new(Notify::new()))
    }

    fn wake(&self, stage: Stage) {
        if let Some(notify) = self.wakeups.get(&stage) {
            notify.notify_one();
        }
    }

    /// Enqueue a stage job. A no-op when the same key is already active.
    pub async fn enqueue(&self, stage: Stage, payload: &StagePayload) -> FolioResult<EnqueueOutcome> {
        let outcome = self
            .store
            .enqueue_job(stage, payload, self.policy(stage).max_attempts)
            .await?;

        match &outcome {
            EnqueueOutcome::Enqueued(job) => {
                info!(job_id = %job.id, %stage, document_id = %payload.document_id, "Enqueued job");
                self.wake(stage);
            }
            EnqueueOutcome::AlreadyActive(job) => {
                debug!(job_id = %job.id, %stage, document_id = %payload.document_id, "Job already active");
            }
        }
        Ok(outcome)
    }

    /// Claim the next due job of a stage.
    pub async fn claim(&self, stage: Stage) -> FolioResult<Option<JobRecord>> {
        self.store.claim_next(stage, Utc::now()).await
    }

    pub async fn complete(&self, job: &JobRecord) -> FolioResult<()> {
        self.store.complete_job(&job.id).await
    }

    pub async fn fail(&self, job: &JobRecord, error: &FolioError) -> FolioResult<()> {
        self.store.fail_job(&job.id, &error.to_string()).await
    }

    /// Put a job back after `delay`.
    pub async fn reschedule(
        &self,
        job: &JobRecord,
        delay: Duration,
        error: &FolioError,
    ) -> FolioResult<()> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| FolioError::queue(format!("Backoff out of range: {}", e)))?;
        self.store
            .reschedule_job(&job.id, Utc::now() + delay, &error.to_string())
            .await
    }

    pub async fn active(&self, stage: Stage, document_id: &str) -> FolioResult<Option<JobRecord>> {
        self.store.active_job(stage, document_id).await
    }

    /// Backoff before the next attempt of `job`.
    ///
    /// Exponential in the attempt count per the stage policy; rate-limit
    /// errors stretch it by `rate_limit_backoff_factor` and honor any
    /// provider `retry-after`.
    pub fn retry_delay(&self, job: &JobRecord, error: &FolioError) -> Duration {
        let policy = self.policy(job.stage);
        let attempt = job.attempts.max(1) as usize;

        let mut delay = ExponentialBuilder::default()
            .with_min_delay(policy.initial_backoff())
            .with_max_delay(policy.max_backoff())
            .with_factor(policy.multiplier)
            .with_max_times(attempt)
            .build()
            .nth(attempt - 1)
            .unwrap_or_else(|| policy.max_backoff());

        if error.is_rate_limit() {
            delay = delay.mul_f32(self.config.rate_limit_backoff_factor.max(1.0));
            if let Some(secs) = error.retry_after() {
                delay = delay.max(Duration::from_secs(secs));
            }
        }
        delay
    }

    /// Return jobs orphaned by a crashed worker and wake every stage.
    pub async fn recover(&self) -> FolioResult<usize> {
        let requeued = self.store.requeue_stale().await?;
        for stage in Stage::iter() {
            self.wake(stage);
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(SqliteStore::in_memory().unwrap()), QueueConfig::default())
    }

    fn job(stage: Stage, attempts: u32) -> JobRecord {
        let now = Utc::now();
        JobRecord {
            id: "job-1".to_string(),
            stage,
            job_key: stage.job_key("doc"),
            payload: StagePayload::new("doc", "alice"),
            status: crate::types::JobStatus::Running,
            attempts,
            max_attempts: 5,
            run_after: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_backoff_grows_per_attempt() {
        let queue = queue();
        let err = FolioError::storage("disk busy");

        let first = queue.retry_delay(&job(Stage::Segmentation, 1), &err);
        let second = queue.retry_delay(&job(Stage::Segmentation, 2), &err);
        let third = queue.retry_delay(&job(Stage::Segmentation, 3), &err);
        assert_eq!(first, Duration::from_millis(500));
        assert!(second > first);
        assert!(third > second);

        // LLM stages start much slower
        let llm = queue.retry_delay(&job(Stage::Analysis, 1), &err);
        assert_eq!(llm, Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_is_capped() {
        let queue = queue();
        let err = FolioError::storage("disk busy");
        let late = queue.retry_delay(&job(Stage::Segmentation, 30), &err);
        assert!(late <= Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_stretches_backoff() {
        let queue = queue();
        let plain = queue.retry_delay(&job(Stage::Analysis, 1), &FolioError::storage("x"));
        let throttled = queue.retry_delay(&job(Stage::Analysis, 1), &FolioError::rate_limit("slow down"));
        let expected = plain * 4;
        let diff = throttled.max(expected) - throttled.min(expected);
        assert!(diff < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_enqueue_wakes_stage() {
        let queue = queue();
        let notify = queue.wakeup(Stage::Analysis);
        let waiter = tokio::spawn(async move { notify.notified().await });

        tokio::task::yield_now().await;
        let outcome = queue
            .enqueue(Stage::Analysis, &StagePayload::new("doc", "alice"))
            .await
            .unwrap();
        assert!(outcome.is_new());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
