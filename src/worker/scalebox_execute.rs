//! Consumer for the `scaleboxExecute` queue (spec §4.7 "Job processor
//! (`executeCode`)"): claims jobs `ScaleboxService::enqueue` left behind and
//! runs them through `ScaleboxService::execute_code`. Grounded in the
//! teacher's `kernel/jobs/worker.rs` claim/process/mark loop (see
//! DESIGN.md), generalized from that repo's seesaw command dispatch to a
//! single fixed job shape.

use crate::common::entity_ids::{CanvasId, Uid};
use crate::execution::ScaleboxService;
use crate::queue::{JobQueue, QueueName, QueuedJob};
use crate::sandbox::{CodeRunParams, ExecutionContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Service;

const BATCH_SIZE: i64 = 10;
const LEASE: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ScaleboxExecuteConsumer {
    queue: Arc<dyn JobQueue>,
    scalebox: Arc<ScaleboxService>,
    /// The provider API key isn't round-tripped through the job payload
    /// (spec §7 redaction discipline: secrets don't belong in persisted job
    /// rows), so the consumer re-supplies it from config at dequeue time.
    api_key: String,
}

impl ScaleboxExecuteConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, scalebox: Arc<ScaleboxService>, api_key: String) -> Self {
        Self { queue, scalebox, api_key }
    }

    async fn process(&self, job: QueuedJob) {
        match serde_json::from_value::<Payload>(job.payload.clone()) {
            Ok(payload) => {
                let params = CodeRunParams {
                    code: payload.params.code,
                    language: payload.params.language,
                };
                let context = ExecutionContext {
                    uid: payload.context.uid,
                    canvas_id: payload.context.canvas_id,
                    api_key: self.api_key.clone(),
                    s3_drive_path: payload.context.s3_drive_path,
                    version: payload.context.version,
                    parent_result_id: payload.context.parent_result_id,
                };
                match self.scalebox.execute_code(&params, &context).await {
                    Ok(_) => {
                        if let Err(error) = self.queue.mark_succeeded(job.id).await {
                            tracing::error!(job_id = %job.id, %error, "failed to mark scalebox execute job succeeded");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(job_id = %job.id, %error, "scalebox execute job failed");
                        if let Err(error) = self.queue.mark_failed(job.id, &error.to_string(), true).await {
                            tracing::error!(job_id = %job.id, %error, "failed to mark scalebox execute job failed");
                        }
                    }
                }
            }
            Err(error) => {
                tracing::error!(job_id = %job.id, %error, "invalid scalebox execute payload, dropping");
                if let Err(error) = self.queue.mark_failed(job.id, &error.to_string(), false).await {
                    tracing::error!(job_id = %job.id, %error, "failed to mark invalid scalebox execute job failed");
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct Payload {
    params: PayloadParams,
    context: PayloadContext,
}

#[derive(Deserialize)]
struct PayloadParams {
    code: String,
    language: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadContext {
    uid: Uid,
    canvas_id: CanvasId,
    s3_drive_path: String,
    version: Option<String>,
    parent_result_id: Option<String>,
}

#[async_trait]
impl Service for ScaleboxExecuteConsumer {
    fn name(&self) -> &'static str {
        "scalebox-execute-consumer"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let jobs = match self.queue.claim(QueueName::ScaleboxExecute, BATCH_SIZE, LEASE).await {
                Ok(jobs) => jobs,
                Err(error) => {
                    tracing::error!(%error, "failed to claim scalebox execute jobs");
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
            let states = jobs.iter().map(|job| self.process(job.clone()));
            futures::future::join_all(states).await;
        }
    }
}
