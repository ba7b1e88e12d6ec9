//! Job runner: claims due jobs and executes them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use orchard_core::JobId;

use super::{QueueError, Task, backoff};
use crate::services::email::Mailer;
use crate::services::notifications::{
    DeliveryError, DeliveryWorker, DispatchError, FanOutDispatcher,
};
use crate::store::Stores;

/// A job leased to this runner.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub id: JobId,
    /// Raw stored task.
    pub payload: serde_json::Value,
    /// Number of this attempt, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Backend the runner pulls jobs from.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Lease up to `limit` due jobs, counting the attempt.
    async fn claim_due(&self, limit: u32) -> Result<Vec<ClaimedJob>, QueueError>;

    /// Remove a job that succeeded.
    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Release a job for another attempt after `delay`.
    async fn retry(&self, id: JobId, error: &str, delay: Duration) -> Result<(), QueueError>;

    /// Park a job that will not be attempted again.
    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    /// Release jobs whose lease outlived their timeout. Returns how many.
    async fn requeue_stale(&self) -> Result<u64, QueueError>;
}

/// Why an attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    FanOut(#[from] DispatchError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// What happened to a job after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Ran to completion and was removed.
    Completed,
    /// Rescheduled after the given backoff.
    Retried(Duration),
    /// Out of attempts, or the payload was unreadable.
    Failed,
}

/// Routes tasks to the service that performs them.
#[derive(Clone)]
pub struct TaskHandler {
    dispatcher: Arc<FanOutDispatcher>,
    worker: Arc<DeliveryWorker>,
}

impl TaskHandler {
    #[must_use]
    pub const fn new(dispatcher: Arc<FanOutDispatcher>, worker: Arc<DeliveryWorker>) -> Self {
        Self { dispatcher, worker }
    }

    /// Wire a handler to `stores`. `shop_url` is the front end linked from
    /// new product emails.
    #[must_use]
    pub fn from_stores(stores: &Stores, mailer: Arc<dyn Mailer>, shop_url: &str) -> Self {
        let dispatcher = FanOutDispatcher::new(
            stores.products.clone(),
            stores.users.clone(),
            stores.queue.clone(),
        );
        let worker = DeliveryWorker::new(
            stores.products.clone(),
            stores.users.clone(),
            stores.notifications.clone(),
            mailer,
            shop_url,
        );
        Self::new(Arc::new(dispatcher), Arc::new(worker))
    }

    /// Run one attempt of `task`.
    ///
    /// # Errors
    ///
    /// Returns the task's error; the runner decides whether to retry.
    pub async fn handle(&self, task: Task) -> Result<(), TaskError> {
        match task {
            Task::NewProductFanOut { product_id } => {
                self.dispatcher.dispatch(product_id).await?;
            }
            Task::NewProductDelivery {
                product_id,
                user_id,
            } => {
                self.worker.deliver(product_id, user_id).await?;
            }
        }
        Ok(())
    }

    /// Record that `task` will not be attempted again.
    pub fn on_permanent_failure(task: Task, error: &str) {
        match task {
            Task::NewProductFanOut { product_id } => {
                error!(%product_id, error, "New product fan-out failed permanently");
            }
            Task::NewProductDelivery {
                product_id,
                user_id,
            } => {
                error!(%product_id, %user_id, error, "New product delivery failed permanently");
            }
        }
    }
}

/// Polls a [`JobSource`] and executes jobs concurrently.
#[derive(Clone)]
pub struct JobRunner {
    source: Arc<dyn JobSource>,
    handler: TaskHandler,
    poll_interval: Duration,
    batch_size: u32,
}

impl JobRunner {
    #[must_use]
    pub fn new(
        source: Arc<dyn JobSource>,
        handler: TaskHandler,
        poll_interval: Duration,
        batch_size: u32,
    ) -> Self {
        Self {
            source,
            handler,
            poll_interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Run until `shutdown` resolves. In-flight jobs of the current batch are
    /// finished before returning.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) {
        info!(
            poll_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            batch = self.batch_size,
            "Job runner started"
        );
        tokio::pin!(shutdown);

        let mut polls: u64 = 0;
        loop {
            if polls % 60 == 0 {
                match self.source.requeue_stale().await {
                    Ok(0) => {}
                    Ok(count) => warn!(count, "Reclaimed stale jobs"),
                    Err(e) => error!(error = %e, "Failed to reclaim stale jobs"),
                }
            }
            polls = polls.wrapping_add(1);

            let processed = match self.run_once().await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "Failed to claim jobs");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
            } else if shutdown_requested(&mut shutdown).await {
                break;
            }
        }

        info!("Job runner stopped");
    }

    /// Claim one batch and run it to completion. Returns the batch size.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if claiming fails. Failures of individual jobs
    /// are handled and logged, not returned.
    pub async fn run_once(&self) -> Result<usize, QueueError> {
        let jobs = self.source.claim_due(self.batch_size).await?;
        let count = jobs.len();
        if count == 0 {
            return Ok(0);
        }
        debug!(count, "Claimed jobs");

        let mut set = JoinSet::new();
        for job in jobs {
            let runner = self.clone();
            let span = info_span!("job", job_id = %job.id, attempt = job.attempt);
            set.spawn(async move { runner.process(job).await }.instrument(span));
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task panicked");
            }
        }

        Ok(count)
    }

    /// Run one attempt of `job` and record the outcome.
    pub async fn process(&self, job: ClaimedJob) -> JobOutcome {
        let task = match serde_json::from_value::<Task>(job.payload.clone()) {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "Unreadable job payload");
                log_outcome(self.source.fail(job.id, &e.to_string()).await);
                return JobOutcome::Failed;
            }
        };

        let result = match tokio::time::timeout(job.timeout, self.handler.handle(task)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::TimedOut(job.timeout)),
        };

        match result {
            Ok(()) => {
                debug!(task = task.name(), "Job completed");
                log_outcome(self.source.complete(job.id).await);
                JobOutcome::Completed
            }
            Err(e) if job.attempt < job.max_attempts => {
                let delay = backoff(job.attempt);
                warn!(
                    task = task.name(),
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Job attempt failed; will retry"
                );
                log_outcome(self.source.retry(job.id, &e.to_string(), delay).await);
                JobOutcome::Retried(delay)
            }
            Err(e) => {
                let message = e.to_string();
                log_outcome(self.source.fail(job.id, &message).await);
                TaskHandler::on_permanent_failure(task, &message);
                JobOutcome::Failed
            }
        }
    }
}

fn log_outcome(result: Result<(), QueueError>) {
    if let Err(e) = result {
        error!(error = %e, "Failed to record job outcome");
    }
}

/// Whether `shutdown` has already resolved, without waiting for it.
async fn shutdown_requested(shutdown: &mut std::pin::Pin<&mut impl Future<Output = ()>>) -> bool {
    tokio::select! {
        biased;
        () = shutdown.as_mut() => true,
        () = std::future::ready(()) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_messages() {
        let err = TaskError::TimedOut(Duration::from_secs(60));
        assert_eq!(err.to_string(), "attempt timed out after 60s");
    }
}
