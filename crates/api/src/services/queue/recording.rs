//! In-memory queue for tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use orchard_core::JobId;

use super::runner::{ClaimedJob, JobSource};
use super::{QueueError, QueueName, Task, TaskQueue};

/// A task as it was handed to [`TaskQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: JobId,
    pub task: Task,
    pub queue: QueueName,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Pending,
    Running,
    Failed,
}

#[derive(Debug)]
struct Job {
    scheduled: ScheduledTask,
    attempts: u32,
    state: JobState,
    last_error: Option<String>,
}

type RejectFn = Box<dyn Fn(&Task) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id: i64,
    history: Vec<ScheduledTask>,
    jobs: Vec<Job>,
    reject: Option<RejectFn>,
}

/// Queue that records scheduled tasks and can feed them to a
/// [`JobRunner`](super::JobRunner).
///
/// Delays are recorded but not waited on: every pending job is claimable
/// immediately, including retries.
#[derive(Default)]
pub struct RecordingQueue {
    inner: Mutex<Inner>,
}

impl RecordingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to schedule tasks matching `predicate`.
    pub fn reject_when(&self, predicate: impl Fn(&Task) -> bool + Send + Sync + 'static) {
        self.lock().reject = Some(Box::new(predicate));
    }

    /// Every task ever scheduled, in scheduling order.
    #[must_use]
    pub fn scheduled(&self) -> Vec<ScheduledTask> {
        self.lock().history.clone()
    }

    /// Scheduled tasks on `queue`.
    #[must_use]
    pub fn scheduled_on(&self, queue: QueueName) -> Vec<ScheduledTask> {
        self.lock()
            .history
            .iter()
            .filter(|s| s.queue == queue)
            .copied()
            .collect()
    }

    /// Jobs still waiting to run or be retried.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock()
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Pending)
            .count()
    }

    /// Permanently failed tasks with their attempt counts and last errors.
    #[must_use]
    pub fn failed(&self) -> Vec<(Task, u32, String)> {
        self.lock()
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Failed)
            .map(|job| {
                (
                    job.scheduled.task,
                    job.attempts,
                    job.last_error.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn schedule(
        &self,
        task: Task,
        queue: QueueName,
        delay: Duration,
    ) -> Result<JobId, QueueError> {
        let mut inner = self.lock();
        if inner.reject.as_ref().is_some_and(|reject| reject(&task)) {
            return Err(QueueError::Rejected(task.name().to_owned()));
        }

        inner.next_id += 1;
        let scheduled = ScheduledTask {
            id: JobId::new(inner.next_id),
            task,
            queue,
            delay,
        };
        inner.history.push(scheduled);
        inner.jobs.push(Job {
            scheduled,
            attempts: 0,
            state: JobState::Pending,
            last_error: None,
        });
        Ok(scheduled.id)
    }
}

#[async_trait]
impl JobSource for RecordingQueue {
    async fn claim_due(&self, limit: u32) -> Result<Vec<ClaimedJob>, QueueError> {
        let mut inner = self.lock();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut claimed = Vec::new();
        for job in inner
            .jobs
            .iter_mut()
            .filter(|job| job.state == JobState::Pending)
            .take(limit)
        {
            job.state = JobState::Running;
            job.attempts += 1;
            let policy = job.scheduled.task.policy();
            claimed.push(ClaimedJob {
                id: job.scheduled.id,
                payload: serde_json::to_value(job.scheduled.task)?,
                attempt: job.attempts,
                max_attempts: policy.max_attempts,
                timeout: policy.timeout,
            });
        }
        Ok(claimed)
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.lock().jobs.retain(|job| job.scheduled.id != id);
        Ok(())
    }

    async fn retry(&self, id: JobId, error: &str, _delay: Duration) -> Result<(), QueueError> {
        if let Some(job) = self.lock().jobs.iter_mut().find(|j| j.scheduled.id == id) {
            job.state = JobState::Pending;
            job.last_error = Some(error.to_owned());
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        if let Some(job) = self.lock().jobs.iter_mut().find(|j| j.scheduled.id == id) {
            job.state = JobState::Failed;
            job.last_error = Some(error.to_owned());
        }
        Ok(())
    }

    async fn requeue_stale(&self) -> Result<u64, QueueError> {
        Ok(0)
    }
}
