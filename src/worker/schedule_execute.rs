//! Consumer for the `scheduleExecution` queue (spec §4.2 step 7, §4.8 "Cron
//! trigger"): claims jobs `ScheduleEngine::trigger_schedule` left behind,
//! normalizes variables against the canvas's declarations with an empty
//! runtime bag (cron triggers carry no runtime payload), invokes the
//! workflow engine, and projects the outcome onto the already-materialized
//! `ScheduleRecord`.

use crate::execution::ExecutionRecordProjector;
use crate::external::{CanvasLookup, TriggerType, WorkflowEngineClient, WorkflowRunOutcome, WorkflowTriggerContext};
use crate::queue::{ExecuteScheduledWorkflowPayload, JobQueue, QueueName, QueuedJob};
use crate::variables::StaticFileLookup;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Service;

const BATCH_SIZE: i64 = 10;
const LEASE: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ScheduleExecuteConsumer {
    queue: Arc<dyn JobQueue>,
    projector: Arc<ExecutionRecordProjector>,
    engine: Arc<dyn WorkflowEngineClient>,
    canvas: Arc<dyn CanvasLookup>,
    files: Arc<dyn StaticFileLookup>,
}

impl ScheduleExecuteConsumer {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        projector: Arc<ExecutionRecordProjector>,
        engine: Arc<dyn WorkflowEngineClient>,
        canvas: Arc<dyn CanvasLookup>,
        files: Arc<dyn StaticFileLookup>,
    ) -> Self {
        Self { queue, projector, engine, canvas, files }
    }

    async fn process(&self, job: QueuedJob) {
        let payload: ExecuteScheduledWorkflowPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(job_id = %job.id, %error, "invalid schedule execution payload, dropping");
                let _ = self.queue.mark_failed(job.id, &error.to_string(), false).await;
                return;
            }
        };

        if let Err(error) = self.projector.mark_running(&payload.schedule_record_id).await {
            tracing::error!(job_id = %job.id, %error, "failed to mark schedule record running");
        }

        let outcome = self.run_engine(&payload).await;
        match outcome {
            Ok(()) => {
                if let Err(error) = self.queue.mark_succeeded(job.id).await {
                    tracing::error!(job_id = %job.id, %error, "failed to mark schedule execution job succeeded");
                }
            }
            Err(error) => {
                tracing::warn!(job_id = %job.id, %error, "schedule execution job failed");
                if let Err(error) = self.queue.mark_failed(job.id, &error.to_string(), true).await {
                    tracing::error!(job_id = %job.id, %error, "failed to mark schedule execution job failed");
                }
            }
        }
    }

    async fn run_engine(&self, payload: &ExecuteScheduledWorkflowPayload) -> anyhow::Result<()> {
        let declared_raw = self.canvas.declared_variables(&payload.canvas_id).await?;
        let declared = serde_json::from_value(declared_raw)
            .map_err(|e| anyhow::anyhow!("invalid declared variables: {e}"))?;
        let variables = crate::variables::normalize(
            payload.uid.to_string().as_str(),
            &declared,
            &HashMap::new(),
            self.files.as_ref(),
        )
        .await;
        let variables_value = serde_json::to_value(&variables).unwrap_or(serde_json::Value::Null);
        let canvas_data = self.canvas.canvas_data(&payload.canvas_id).await?;

        let outcome: anyhow::Result<WorkflowRunOutcome> = self
            .engine
            .execute_from_canvas_data(
                &payload.uid,
                &canvas_data,
                &variables_value,
                WorkflowTriggerContext {
                    schedule_id: Some(payload.schedule_id),
                    schedule_record_id: Some(payload.schedule_record_id),
                    trigger_type: TriggerType::Cron,
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                self.projector
                    .mark_success(&payload.schedule_record_id, &outcome.execution_canvas_id, &outcome.workflow_execution_id)
                    .await
                    .map_err(anyhow::Error::from)?;
                Ok(())
            }
            Err(error) => {
                self.projector
                    .mark_failed(&payload.schedule_record_id, &error)
                    .await
                    .map_err(anyhow::Error::from)?;
                Err(error)
            }
        }
    }
}

#[async_trait]
impl Service for ScheduleExecuteConsumer {
    fn name(&self) -> &'static str {
        "schedule-execute-consumer"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let jobs = match self.queue.claim(QueueName::ScheduleExecution, BATCH_SIZE, LEASE).await {
                Ok(jobs) => jobs,
                Err(error) => {
                    tracing::error!(%error, "failed to claim schedule execution jobs");
                    Vec::new()
                }
            };
            if jobs.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                continue;
            }
            let tasks = jobs.iter().map(|job| self.process(job.clone()));
            futures::future::join_all(tasks).await;
        }
    }
}
