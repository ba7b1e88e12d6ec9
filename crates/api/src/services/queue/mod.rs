//! Durable background tasks.
//!
//! Producers hand a [`Task`] to a [`TaskQueue`] and move on; the
//! [`JobRunner`](runner::JobRunner) later claims due jobs, runs each attempt
//! under the task's timeout and retries with exponential backoff until the
//! attempts run out. Tasks carry identifiers only; handlers re-read the
//! current rows when they run.

pub mod runner;

#[cfg(feature = "test-support")]
mod recording;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orchard_core::{JobId, ProductId, UserId};

use crate::db::RepositoryError;

#[cfg(feature = "test-support")]
pub use recording::{RecordingQueue, ScheduledTask};
pub use runner::{JobRunner, JobSource, TaskHandler};

/// Named queues. Each task type has a home queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Bulk notification work.
    Notifications,
    /// Individual outbound emails.
    Emails,
}

impl QueueName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Emails => "emails",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notifications" => Ok(Self::Notifications),
            "emails" => Ok(Self::Emails),
            _ => Err(format!("unknown queue: {s}")),
        }
    }
}

/// Attempt budget for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wall-clock limit for one attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// New-product fan-out: resolving subscribers and scheduling deliveries.
    pub const FAN_OUT: Self = Self {
        max_attempts: 3,
        timeout: Duration::from_secs(300),
    };

    /// A single new-product delivery.
    pub const DELIVERY: Self = Self {
        max_attempts: 3,
        timeout: Duration::from_secs(60),
    };
}

/// Delay before the fan-out for a freshly created product runs.
pub const FAN_OUT_DELAY: Duration = Duration::from_secs(5);

/// Work the runner knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Find every new-product subscriber and schedule a delivery for each.
    NewProductFanOut { product_id: ProductId },
    /// Notify one user about one product.
    NewProductDelivery {
        product_id: ProductId,
        user_id: UserId,
    },
}

impl Task {
    /// Name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewProductFanOut { .. } => "new_product_fan_out",
            Self::NewProductDelivery { .. } => "new_product_delivery",
        }
    }

    /// Queue the task runs on.
    #[must_use]
    pub const fn queue(&self) -> QueueName {
        match self {
            Self::NewProductFanOut { .. } => QueueName::Notifications,
            Self::NewProductDelivery { .. } => QueueName::Emails,
        }
    }

    /// Attempts and per-attempt timeout.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        match self {
            Self::NewProductFanOut { .. } => RetryPolicy::FAN_OUT,
            Self::NewProductDelivery { .. } => RetryPolicy::DELIVERY,
        }
    }
}

/// Errors raised by queue backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The task could not be encoded or a stored payload decoded.
    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The backend refused the job.
    #[error("queue rejected task: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Port for scheduling tasks. Delivery is at least once.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist `task` on `queue`, runnable after `delay`.
    async fn schedule(
        &self,
        task: Task,
        queue: QueueName,
        delay: Duration,
    ) -> Result<JobId, QueueError>;
}

/// Delay before retry number `attempt` (1-based count of attempts made).
///
/// 10 s after the first failure, doubling each time, capped at 10 minutes.
#[must_use]
pub fn backoff(attempt: u32) -> Duration {
    const BASE_SECS: u64 = 10;
    const MAX_SECS: u64 = 600;

    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_secs(BASE_SECS.saturating_mul(1_u64 << exponent).min(MAX_SECS))
}
