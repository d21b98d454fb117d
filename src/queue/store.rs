//! Postgres-backed queue store (spec §2 L2), grounded in the reference
//! monorepo's `kernel/jobs/queue.rs` (`EnqueueResult`, `JobQueue` trait) and
//! `kernel/jobs/job.rs` (`claim_jobs()`'s `FOR UPDATE SKIP LOCKED` pattern).

use super::model::{JobState, Priority, QueueName, QueuedJob};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Mirrors the teacher's `EnqueueResult` (`Created` vs `Duplicate`) so
/// callers relying on "at-most-one job id" (spec §2 L2) can tell whether
/// their coalescing key (e.g. `pause:{sandboxId}`) already had a pending job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Created(Uuid),
    Duplicate(Uuid),
}

impl EnqueueResult {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Duplicate(id) => *id,
        }
    }
}

pub struct EnqueueOptions {
    pub job_id: Option<String>,
    pub priority: Priority,
    pub delay: Option<Duration>,
    pub max_attempts: i32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            priority: Priority::default(),
            delay: None,
            max_attempts: 1,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<EnqueueResult>;

    async fn get_jobs(&self, queue: QueueName, states: &[JobState]) -> Result<Vec<QueuedJob>>;

    /// Removes a job regardless of state, used by quota enforcement to drop
    /// pending/delayed jobs for disabled schedules (spec §4.2 step 4, §4.9).
    async fn remove(&self, job_id: Uuid) -> Result<()>;

    /// Claims up to `batch_size` due, highest-priority jobs for `queue`,
    /// leasing them for `lease` and marking them active. Also reclaims
    /// jobs whose lease expired without completion (crashed worker).
    async fn claim(
        &self,
        queue: QueueName,
        batch_size: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedJob>>;

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    async fn mark_failed(&self, job_id: Uuid, reason: &str, retryable: bool) -> Result<()>;

    async fn count(&self, queue: QueueName, states: &[JobState]) -> Result<i64>;
}

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<EnqueueResult> {
        if let Some(job_id) = &options.job_id {
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM queue_jobs \
                 WHERE queue = $1 AND job_id = $2 AND state IN ('waiting', 'delayed') \
                 LIMIT 1",
            )
            .bind(queue)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((id,)) = existing {
                return Ok(EnqueueResult::Duplicate(id));
            }
        }

        let run_at = Utc::now()
            + options
                .delay
                .map(|d| ChronoDuration::milliseconds(d.as_millis() as i64))
                .unwrap_or_else(ChronoDuration::zero);
        let state = if options.delay.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO queue_jobs (queue, job_id, payload, priority, state, max_attempts, run_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id",
        )
        .bind(queue)
        .bind(options.job_id)
        .bind(payload)
        .bind(options.priority.value())
        .bind(state)
        .bind(options.max_attempts)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(EnqueueResult::Created(id))
    }

    async fn get_jobs(&self, queue: QueueName, states: &[JobState]) -> Result<Vec<QueuedJob>> {
        let jobs = sqlx::query_as::<_, QueuedJob>(
            "SELECT * FROM queue_jobs WHERE queue = $1 AND state = ANY($2) ORDER BY priority ASC, created_at ASC",
        )
        .bind(queue)
        .bind(states)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn remove(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE queue_jobs SET state = 'removed' WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim(
        &self,
        queue: QueueName,
        batch_size: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedJob>> {
        let lease_secs = lease.as_secs() as i64;
        let jobs = sqlx::query_as::<_, QueuedJob>(
            r#"
            WITH next_jobs AS (
                SELECT id FROM queue_jobs
                WHERE queue = $1
                  AND run_at <= now()
                  AND (
                    state IN ('waiting', 'delayed')
                    OR (state = 'active' AND lease_expires_at < now())
                  )
                ORDER BY priority ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue_jobs
            SET state = 'active',
                attempts = attempts + 1,
                lease_expires_at = now() + ($3 || ' seconds')::interval
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING *
            "#,
        )
        .bind(queue)
        .bind(batch_size)
        .bind(lease_secs)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE queue_jobs SET state = 'completed', completed_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, reason: &str, retryable: bool) -> Result<()> {
        if retryable {
            let row: Option<(i32, i32)> = sqlx::query_as(
                "SELECT attempts, max_attempts FROM queue_jobs WHERE id = $1",
            )
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((attempts, max_attempts)) = row {
                if attempts < max_attempts {
                    let backoff = backoff_for_attempt(attempts);
                    sqlx::query(
                        "UPDATE queue_jobs SET state = 'waiting', run_at = now() + ($2 || ' seconds')::interval, failure_reason = $3 WHERE id = $1",
                    )
                    .bind(job_id)
                    .bind(backoff.as_secs() as i64)
                    .bind(reason)
                    .execute(&self.pool)
                    .await?;
                    return Ok(());
                }
            }
        }
        sqlx::query(
            "UPDATE queue_jobs SET state = 'failed', completed_at = now(), failure_reason = $2 WHERE id = $1",
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self, queue: QueueName, states: &[JobState]) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM queue_jobs WHERE queue = $1 AND state = ANY($2)",
        )
        .bind(queue)
        .bind(states)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// `2^attempts` seconds capped at an hour, the same backoff curve as the
/// teacher's `mark_failed` in `kernel/jobs/queue.rs`.
fn backoff_for_attempt(attempts: i32) -> Duration {
    let seconds = 2u64.saturating_pow(attempts.max(0) as u32).min(3600);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff_for_attempt(20), Duration::from_secs(3600));
    }

    #[test]
    fn enqueue_result_job_id_unwraps_either_variant() {
        let id = Uuid::new_v4();
        assert_eq!(EnqueueResult::Created(id).job_id(), id);
        assert_eq!(EnqueueResult::Duplicate(id).job_id(), id);
    }
}
