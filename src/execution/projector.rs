//! Execution Record Projector (spec §4.8, component C7): the `ScheduleRecord`
//! lifecycle transitions driven by a trigger and the external workflow
//! engine's `executeFromCanvasData` call.

use crate::common::entity_ids::{CanvasId, ScheduleId, ScheduleRecordId, Uid};
use crate::error::{ControlPlaneError, Result};
use crate::external::{TriggerType, WorkflowEngineClient, WorkflowTriggerContext};
use crate::schedule::model::ScheduleRecordStatus;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

/// Truncation length for `errorDetails.stack` before it's persisted (spec
/// §4.8: "a truncated `errorDetails` JSON").
const ERROR_STACK_TRUNCATE: usize = 4_000;

pub struct ExecutionRecordProjector {
    pool: PgPool,
    engine: Arc<dyn WorkflowEngineClient>,
}

impl ExecutionRecordProjector {
    pub fn new(pool: PgPool, engine: Arc<dyn WorkflowEngineClient>) -> Self {
        Self { pool, engine }
    }

    /// Spec §4.8 "Webhook/API trigger": creates a `running` record, invokes
    /// the workflow engine, and projects the outcome. Blocks until the
    /// engine call returns — callers on the HTTP ingress path that need to
    /// respond before completion should use [`Self::start_running_trigger`]
    /// plus [`Self::finish_trigger`] instead.
    pub async fn run_webhook_or_api_trigger(
        &self,
        uid: &Uid,
        canvas_id: &CanvasId,
        canvas_data: &Value,
        variables: &Value,
        trigger_type: TriggerType,
        workflow_title: &str,
        priority: i16,
    ) -> Result<ScheduleRecordId> {
        let record_id = self
            .start_running_trigger(uid, canvas_id, workflow_title, priority)
            .await?;
        self.finish_trigger(uid, canvas_data, variables, trigger_type, record_id)
            .await?;
        Ok(record_id)
    }

    /// The first half of [`Self::run_webhook_or_api_trigger`]: inserts the
    /// `running` record and returns its id immediately, before the engine is
    /// ever called. Spec §6's `/v1/openapi/workflow/run` returns
    /// `{executionId, status: "running"}` before the workflow finishes, so
    /// the ingress route awaits only this half and spawns
    /// [`Self::finish_trigger`] in the background.
    pub async fn start_running_trigger(
        &self,
        uid: &Uid,
        canvas_id: &CanvasId,
        workflow_title: &str,
        priority: i16,
    ) -> Result<ScheduleRecordId> {
        let now = crate::common::time::now();
        self.insert_record(InsertRecord {
            schedule_id: None,
            uid: *uid,
            source_canvas_id: *canvas_id,
            workflow_title: workflow_title.to_string(),
            status: ScheduleRecordStatus::Running,
            priority,
            scheduled_at: now,
            triggered_at: Some(now),
        })
        .await
    }

    /// The second half: invokes the workflow engine against an already-
    /// `running` record and projects the outcome onto it.
    pub async fn finish_trigger(
        &self,
        uid: &Uid,
        canvas_data: &Value,
        variables: &Value,
        trigger_type: TriggerType,
        record_id: ScheduleRecordId,
    ) -> Result<()> {
        let outcome = self
            .engine
            .execute_from_canvas_data(
                uid,
                canvas_data,
                variables,
                WorkflowTriggerContext {
                    schedule_id: None,
                    schedule_record_id: Some(record_id),
                    trigger_type,
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                self.mark_success(&record_id, &outcome.execution_canvas_id, &outcome.workflow_execution_id)
                    .await?;
            }
            Err(error) => {
                self.mark_failed(&record_id, &error).await?;
            }
        }
        Ok(())
    }

    /// Spec §4.8 "Manual trigger": the record starts `pending` so the UI
    /// gets immediate feedback; a worker later flips it through
    /// running/success/failed via [`Self::mark_running`], [`Self::mark_success`],
    /// [`Self::mark_failed`].
    pub async fn start_manual_trigger(
        &self,
        uid: &Uid,
        canvas_id: &CanvasId,
        workflow_title: &str,
        priority: i16,
    ) -> Result<ScheduleRecordId> {
        let now = crate::common::time::now();
        self.insert_record(InsertRecord {
            schedule_id: None,
            uid: *uid,
            source_canvas_id: *canvas_id,
            workflow_title: workflow_title.to_string(),
            status: ScheduleRecordStatus::Pending,
            priority,
            scheduled_at: now,
            triggered_at: None,
        })
        .await
    }

    pub async fn mark_running(&self, record_id: &ScheduleRecordId) -> Result<()> {
        sqlx::query("UPDATE schedule_records SET status = 'running', triggered_at = now() WHERE id = $1")
            .bind(record_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(ControlPlaneError::Database)?;
        Ok(())
    }

    pub async fn mark_success(
        &self,
        record_id: &ScheduleRecordId,
        canvas_id: &CanvasId,
        workflow_execution_id: &crate::common::entity_ids::WorkflowExecutionId,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE schedule_records \
             SET status = 'success', canvas_id = $2, workflow_execution_id = $3, completed_at = now() \
             WHERE id = $1",
        )
        .bind(record_id.as_uuid())
        .bind(canvas_id.as_uuid())
        .bind(workflow_execution_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(())
    }

    pub async fn mark_failed(&self, record_id: &ScheduleRecordId, error: &anyhow::Error) -> Result<()> {
        let message = error.to_string();
        let details = serde_json::json!({
            "message": message,
            "name": "WorkflowEngineError",
            "stack": truncate(&format!("{error:?}"), ERROR_STACK_TRUNCATE),
        });
        sqlx::query(
            "UPDATE schedule_records \
             SET status = 'failed', failure_reason = $2, error_details = $3, completed_at = now() \
             WHERE id = $1",
        )
        .bind(record_id.as_uuid())
        .bind(&message)
        .bind(&details)
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(())
    }

    /// Spec §4.8 "Retry of a `failed` record": requires a non-null
    /// `snapshotStorageKey` and a non-deleted parent schedule; resets the
    /// record to `pending` and clears the failure fields.
    pub async fn retry_failed_record(&self, record_id: &ScheduleRecordId) -> Result<ScheduleId> {
        let record = self.fetch_record(record_id).await?.ok_or_else(|| {
            ControlPlaneError::NotFound(format!("schedule record {record_id} not found"))
        })?;
        if !record.is_retryable() {
            return Err(ControlPlaneError::RequestParams(
                "record is not a failed record with a snapshot".to_string(),
            ));
        }
        let schedule_id = record.schedule_id.ok_or_else(|| {
            ControlPlaneError::RequestParams("record has no parent schedule to retry against".to_string())
        })?;
        let parent_deleted: Option<(Option<chrono::DateTime<chrono::Utc>>,)> = sqlx::query_as(
            "SELECT deleted_at FROM schedules WHERE id = $1",
        )
        .bind(schedule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        match parent_deleted {
            Some((None,)) => {}
            _ => {
                return Err(ControlPlaneError::RequestParams(
                    "parent schedule is deleted or missing".to_string(),
                ))
            }
        }

        sqlx::query(
            "UPDATE schedule_records \
             SET status = 'pending', failure_reason = NULL, error_details = NULL, triggered_at = now() \
             WHERE id = $1",
        )
        .bind(record_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;

        Ok(schedule_id)
    }

    async fn fetch_record(&self, record_id: &ScheduleRecordId) -> Result<Option<crate::schedule::model::ScheduleRecord>> {
        let record = sqlx::query_as::<_, crate::schedule::model::ScheduleRecord>(
            "SELECT * FROM schedule_records WHERE id = $1",
        )
        .bind(record_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(record)
    }

    async fn insert_record(&self, record: InsertRecord) -> Result<ScheduleRecordId> {
        let (id,): (uuid::Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO schedule_records
                (schedule_id, uid, source_canvas_id, canvas_id, workflow_title, status, priority, scheduled_at, triggered_at)
            VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(record.schedule_id.map(|id: ScheduleId| *id.as_uuid()))
        .bind(record.uid.as_uuid())
        .bind(record.source_canvas_id.as_uuid())
        .bind(&record.workflow_title)
        .bind(record.status)
        .bind(record.priority)
        .bind(record.scheduled_at)
        .bind(record.triggered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(ScheduleRecordId::from_uuid(id))
    }
}

struct InsertRecord {
    schedule_id: Option<ScheduleId>,
    uid: Uid,
    source_canvas_id: CanvasId,
    workflow_title: String,
    status: ScheduleRecordStatus,
    priority: i16,
    scheduled_at: chrono::DateTime<chrono::Utc>,
    triggered_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundary_not_byte_length() {
        let s = "é".repeat(10);
        assert_eq!(truncate(&s, 3).chars().count(), 3);
    }
}
