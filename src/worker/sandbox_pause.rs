//! Consumer for the `scaleboxPause` queue (spec §4.5 step 4 "Auto-pause"):
//! runs `sandbox::processors::auto_pause` for each due pause job. Grounded
//! in the same `kernel/jobs/worker.rs` claim loop as
//! [`super::scalebox_execute`].

use crate::queue::{JobQueue, QueueName, QueuedJob};
use crate::sandbox::provider::SandboxProvider;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Service;

const BATCH_SIZE: i64 = 20;
const LEASE: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct SandboxPauseConsumer {
    queue: Arc<dyn JobQueue>,
    redis: ConnectionManager,
    provider: Arc<dyn SandboxProvider>,
}

impl SandboxPauseConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, redis: ConnectionManager, provider: Arc<dyn SandboxProvider>) -> Self {
        Self { queue, redis, provider }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    sandbox_id: String,
}

#[async_trait]
impl Service for SandboxPauseConsumer {
    fn name(&self) -> &'static str {
        "sandbox-pause-consumer"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let jobs: Vec<QueuedJob> = match self.queue.claim(QueueName::ScaleboxPause, BATCH_SIZE, LEASE).await {
                Ok(jobs) => jobs,
                Err(error) => {
                    tracing::error!(%error, "failed to claim sandbox pause jobs");
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
            for job in jobs {
                let payload: Payload = match serde_json::from_value(job.payload.clone()) {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::error!(job_id = %job.id, %error, "invalid sandbox pause payload, dropping");
                        let _ = self.queue.mark_failed(job.id, &error.to_string(), false).await;
                        continue;
                    }
                };
                match crate::sandbox::processors::auto_pause(&self.redis, self.provider.as_ref(), &payload.sandbox_id).await {
                    Ok(()) => {
                        if let Err(error) = self.queue.mark_succeeded(job.id).await {
                            tracing::error!(job_id = %job.id, %error, "failed to mark sandbox pause job succeeded");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(sandbox_id = %payload.sandbox_id, %error, "auto-pause failed");
                        if let Err(error) = self.queue.mark_failed(job.id, &error.to_string(), true).await {
                            tracing::error!(job_id = %job.id, %error, "failed to mark sandbox pause job failed");
                        }
                    }
                }
            }
        }
    }
}
