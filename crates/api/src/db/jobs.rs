//! Durable job queue on Postgres.
//!
//! Jobs are claimed with `FOR UPDATE SKIP LOCKED`, so several runners can
//! poll the same table without handing a job to two of them. A claimed job
//! is `running` until it completes (deleted), is retried (`pending` again
//! with a later `run_at`) or runs out of attempts (`failed`, kept for
//! inspection).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use orchard_core::JobId;

use super::corrupt;
use crate::services::queue::runner::{ClaimedJob, JobSource};
use crate::services::queue::{QueueError, QueueName, Task, TaskQueue};

#[derive(Debug, sqlx::FromRow)]
struct ClaimedRow {
    id: i64,
    payload: Value,
    attempts: i32,
    max_attempts: i32,
    timeout_secs: i32,
}

impl TryFrom<ClaimedRow> for ClaimedJob {
    type Error = QueueError;

    fn try_from(row: ClaimedRow) -> Result<Self, Self::Error> {
        let attempt = u32::try_from(row.attempts).map_err(|e| corrupt("attempts", e))?;
        let max_attempts = u32::try_from(row.max_attempts).map_err(|e| corrupt("max_attempts", e))?;
        let timeout_secs = u64::try_from(row.timeout_secs).map_err(|e| corrupt("timeout", e))?;
        Ok(Self {
            id: JobId::new(row.id),
            payload: row.payload,
            attempt,
            max_attempts,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn millis(delay: Duration) -> i64 {
    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)
}

/// Postgres-backed [`TaskQueue`] and [`JobSource`].
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Jobs that ran out of attempts, newest first, with their last error.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Repository` if the query fails.
    pub async fn failed(&self, limit: u32) -> Result<Vec<(JobId, Value, String)>, QueueError> {
        let rows: Vec<(i64, Value, Option<String>)> = sqlx::query_as(
            r"
            SELECT id, payload, last_error
            FROM jobs
            WHERE status = 'failed'
            ORDER BY id DESC
            LIMIT $1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, payload, error)| (JobId::new(id), payload, error.unwrap_or_default()))
            .collect())
    }
}

#[async_trait]
impl TaskQueue for JobRepository {
    async fn schedule(
        &self,
        task: Task,
        queue: QueueName,
        delay: Duration,
    ) -> Result<JobId, QueueError> {
        let policy = task.policy();
        let timeout_secs = i32::try_from(policy.timeout.as_secs()).unwrap_or(i32::MAX);
        let max_attempts = i32::try_from(policy.max_attempts).unwrap_or(i32::MAX);

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO jobs (queue, payload, max_attempts, timeout_secs, run_at)
            VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 millisecond'))
            RETURNING id
            ",
        )
        .bind(queue.as_str())
        .bind(serde_json::to_value(task)?)
        .bind(max_attempts)
        .bind(timeout_secs)
        .bind(millis(delay))
        .fetch_one(&self.pool)
        .await?;

        Ok(JobId::new(id))
    }
}

#[async_trait]
impl JobSource for JobRepository {
    async fn claim_due(&self, limit: u32) -> Result<Vec<ClaimedJob>, QueueError> {
        let rows = sqlx::query_as::<_, ClaimedRow>(
            r"
            UPDATE jobs
            SET status = 'running', attempts = attempts + 1, locked_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending' AND run_at <= NOW()
                ORDER BY run_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, attempts, max_attempts, timeout_secs
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ClaimedJob::try_from).collect()
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn retry(&self, id: JobId, error: &str, delay: Duration) -> Result<(), QueueError> {
        sqlx::query(
            r"
            UPDATE jobs
            SET status = 'pending',
                run_at = NOW() + ($3 * INTERVAL '1 millisecond'),
                locked_at = NULL,
                last_error = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .bind(millis(delay))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', locked_at = NULL, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_stale(&self) -> Result<u64, QueueError> {
        // A lease older than twice the attempt timeout belongs to a runner
        // that died mid-attempt. The lost attempt still counts.
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET status = CASE WHEN attempts >= max_attempts
                              THEN 'failed'::job_status
                              ELSE 'pending'::job_status END,
                locked_at = NULL,
                run_at = NOW(),
                last_error = COALESCE(last_error, 'lease expired')
            WHERE status = 'running'
              AND locked_at < NOW() - (timeout_secs * 2 * INTERVAL '1 second')
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
