//! Schedule Engine (spec §4.2, component C2): leader-elected cron scan,
//! due-work discovery, quota enforcement, and idempotent per-tick record
//! materialization. Grounded in the reference monorepo's
//! `kernel/scheduled_tasks.rs` scan-loop shape, generalized away from
//! `tokio_cron_scheduler`'s fixed compile-time jobs to this spec's
//! DB-stored, per-row, per-timezone schedules under a distributed scan lock
//! (see DESIGN.md for the dependency swap).

use super::cron;
use super::model::Schedule;
use super::quota;
use crate::common::entity_ids::{ScheduleId, ScheduleRecordId};
use crate::config::SchedulingConfig;
use crate::error::{ControlPlaneError, Result};
use crate::external::CanvasLookup;
use crate::priority::{self, PriorityInputs};
use crate::queue::{EnqueueOptions, ExecuteScheduledWorkflowPayload, JobQueue, Priority, QueueName};
use crate::redis::lock::{schedule_scan_key, LockHandle};
use chrono::Duration as ChronoDuration;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::sync::Arc;

pub struct ScheduleEngine {
    pool: PgPool,
    redis: ConnectionManager,
    queue: Arc<dyn JobQueue>,
    priority_inputs: Arc<dyn PriorityInputs>,
    canvas: Arc<dyn CanvasLookup>,
    config: SchedulingConfig,
}

/// Guards fresh-read races against the exact instant `now` is evaluated
/// (spec §4.2 step 1: "nextRunAt > now + ε").
const FRESH_READ_EPSILON: ChronoDuration = ChronoDuration::milliseconds(0);

impl ScheduleEngine {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        queue: Arc<dyn JobQueue>,
        priority_inputs: Arc<dyn PriorityInputs>,
        canvas: Arc<dyn CanvasLookup>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            pool,
            redis,
            queue,
            priority_inputs,
            canvas,
            config,
        }
    }

    /// Contract — scan tick (spec §4.2). Acquires the coarse scan lock,
    /// fans out over due schedules isolating per-schedule failures, and
    /// releases the lock on every exit path.
    pub async fn scan_tick(&self) -> Result<()> {
        let lock = match LockHandle::try_acquire(
            self.redis.clone(),
            schedule_scan_key(),
            self.config.scan_lock_ttl,
        )
        .await
        .map_err(|e| ControlPlaneError::Internal(e.into()))?
        {
            Some(lock) => lock,
            None => {
                tracing::debug!("schedule scan lock held elsewhere, skipping tick");
                return Ok(());
            }
        };

        let due_ids = self.find_due_schedule_ids().await;
        match due_ids {
            Ok(ids) => {
                for schedule_id in ids {
                    if let Err(error) = self.trigger_schedule(&schedule_id).await {
                        tracing::error!(%schedule_id, %error, "per-schedule trigger failed, continuing batch");
                    }
                }
            }
            Err(error) => {
                tracing::error!(%error, "failed to query due schedules this tick");
            }
        }

        // Release on every exit path, including the DB failure above (spec
        // §4.2 step 4, §4.9: "Lock is released on all paths").
        if let Err(error) = lock.release().await {
            tracing::warn!(%error, "failed to release schedule scan lock (will expire via TTL)");
        }
        Ok(())
    }

    async fn find_due_schedule_ids(&self) -> anyhow::Result<Vec<ScheduleId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM schedules WHERE is_enabled = true AND deleted_at IS NULL AND next_run_at <= now()",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| ScheduleId::from_uuid(id)).collect())
    }

    /// Contract — per-schedule trigger (spec §4.2 steps 1-7).
    pub async fn trigger_schedule(&self, schedule_id: &ScheduleId) -> Result<()> {
        // Step 1: fresh read + gate.
        let schedule = match self.fetch_schedule(schedule_id).await? {
            Some(s) => s,
            None => return Ok(()),
        };
        let now = crate::common::time::now();
        if !schedule.is_due(now, FRESH_READ_EPSILON) {
            tracing::debug!(%schedule_id, "fresh read shows schedule no longer due, skipping");
            return Ok(());
        }

        // Step 2: parse cron under the schedule's timezone.
        let new_next_run_at = match cron::next_occurrence(&schedule.cron_expression, &schedule.timezone, now)
        {
            Ok(next) => next,
            Err(error) => {
                self.disable_with_reason(schedule_id, &format!("invalid_cron_expression: {error}"))
                    .await?;
                return Ok(());
            }
        };

        // Step 3: advance nextRunAt before doing anything else observable,
        // so a concurrent trigger's fresh read sees the future instant
        // (spec P3, scenario 4).
        sqlx::query("UPDATE schedules SET last_run_at = $2, next_run_at = $3 WHERE id = $1")
            .bind(schedule_id.as_uuid())
            .bind(now)
            .bind(new_next_run_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ControlPlaneError::Database(e))?;

        // Step 4: plan quota enforcement.
        let plan = self.priority_inputs.active_plan(&schedule.uid).await.ok().flatten();
        if let Err(error) = quota::enforce_quota(
            &self.pool,
            self.queue.as_ref(),
            &schedule.uid,
            plan,
            self.config.free_max_active_schedules,
            self.config.paid_max_active_schedules,
            schedule_id,
        )
        .await
        {
            tracing::warn!(%schedule_id, %error, "quota enforcement failed, proceeding with trigger");
        }

        let priority_value = priority::priority(&schedule.uid, self.priority_inputs.as_ref(), &self.config)
            .await
            .unwrap_or(self.config.default_priority);

        // Step 5: reuse-or-create the current pending record.
        let title = self
            .canvas
            .title(&schedule.canvas_id)
            .await
            .unwrap_or_else(|_| "untitled workflow".to_string());
        let record_id = self
            .upsert_pending_record(&schedule, priority_value, now, &title)
            .await
            .map_err(|e| ControlPlaneError::Database(e))?;

        // Step 6: materialize the next `scheduled` record.
        self.materialize_next_scheduled(&schedule, new_next_run_at, priority_value, &title)
            .await
            .map_err(|e| ControlPlaneError::Database(e))?;

        // Step 7: enqueue, logging but not rolling back on failure (spec
        // §4.2 "Failure semantics").
        let payload = ExecuteScheduledWorkflowPayload {
            schedule_id: *schedule_id,
            canvas_id: schedule.canvas_id,
            uid: schedule.uid,
            scheduled_at: now,
            priority: priority_value as i16,
            schedule_record_id: record_id,
        };
        if let Err(error) = self
            .queue
            .enqueue(
                QueueName::ScheduleExecution,
                serde_json::to_value(&payload).unwrap_or_default(),
                EnqueueOptions {
                    priority: Priority::new(priority_value as i16),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::error!(%schedule_id, %error, "failed to enqueue execute-scheduled-workflow job");
        }

        Ok(())
    }

    async fn fetch_schedule(&self, schedule_id: &ScheduleId) -> Result<Option<Schedule>> {
        let schedule = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = $1")
            .bind(schedule_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(ControlPlaneError::Database)?;
        Ok(schedule)
    }

    async fn disable_with_reason(&self, schedule_id: &ScheduleId, reason: &str) -> Result<()> {
        let schedule = self.fetch_schedule(schedule_id).await?;
        let Some(schedule) = schedule else { return Ok(()) };
        let disabled = schedule.with_disabled_reason(reason);
        sqlx::query(
            "UPDATE schedules SET is_enabled = false, next_run_at = NULL, schedule_config = $2 WHERE id = $1",
        )
        .bind(schedule_id.as_uuid())
        .bind(&disabled.schedule_config)
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(())
    }

    /// Spec §4.2 step 5: update an existing `scheduled` record to `pending`
    /// if one exists, else create a fresh one.
    async fn upsert_pending_record(
        &self,
        schedule: &Schedule,
        priority_value: u8,
        now: chrono::DateTime<chrono::Utc>,
        title: &str,
    ) -> anyhow::Result<ScheduleRecordId> {
        let existing: Option<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM schedule_records WHERE schedule_id = $1 AND status = 'scheduled' LIMIT 1",
        )
        .bind(schedule.id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query(
                "UPDATE schedule_records SET status = 'pending', triggered_at = $2 WHERE id = $1",
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            return Ok(ScheduleRecordId::from_uuid(id));
        }

        let (id,): (uuid::Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO schedule_records
                (schedule_id, uid, source_canvas_id, canvas_id, workflow_title, status, priority, scheduled_at, triggered_at)
            VALUES ($1, $2, $3, NULL, $4, 'pending', $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(schedule.id.as_uuid())
        .bind(schedule.uid.as_uuid())
        .bind(schedule.canvas_id.as_uuid())
        .bind(title)
        .bind(priority_value as i16)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(ScheduleRecordId::from_uuid(id))
    }

    /// Spec §4.2 step 6: keep exactly one `scheduled` record per schedule
    /// (spec §3 invariant).
    async fn materialize_next_scheduled(
        &self,
        schedule: &Schedule,
        next_run_at: chrono::DateTime<chrono::Utc>,
        priority_value: u8,
        title: &str,
    ) -> anyhow::Result<()> {
        let existing: Option<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM schedule_records WHERE schedule_id = $1 AND status = 'scheduled' LIMIT 1",
        )
        .bind(schedule.id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE schedule_records SET scheduled_at = $2 WHERE id = $1")
                .bind(id)
                .bind(next_run_at)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO schedule_records
                    (schedule_id, uid, source_canvas_id, canvas_id, workflow_title, status, priority, scheduled_at)
                VALUES ($1, $2, $3, NULL, $4, 'scheduled', $5, $6)
                "#,
            )
            .bind(schedule.id.as_uuid())
            .bind(schedule.uid.as_uuid())
            .bind(schedule.canvas_id.as_uuid())
            .bind(title)
            .bind(priority_value as i16)
            .bind(next_run_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_read_epsilon_is_zero_by_default() {
        assert_eq!(FRESH_READ_EPSILON, ChronoDuration::zero());
    }
}
