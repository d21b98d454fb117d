//! Consumer for the `scaleboxKill` queue (spec §4.5 step 5 "fire-and-forget
//! kill"): runs `sandbox::processors::kill`'s retry loop for each claimed
//! job and always marks the job succeeded since `kill` never signals
//! failure upward (the retries already happened inside it).

use crate::config::SandboxConfig;
use crate::queue::{JobQueue, QueueName, QueuedJob};
use crate::sandbox::provider::SandboxProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Service;

const BATCH_SIZE: i64 = 20;
const LEASE: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct SandboxKillConsumer {
    queue: Arc<dyn JobQueue>,
    provider: Arc<dyn SandboxProvider>,
    config: SandboxConfig,
}

impl SandboxKillConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, provider: Arc<dyn SandboxProvider>, config: SandboxConfig) -> Self {
        Self { queue, provider, config }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    sandbox_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Service for SandboxKillConsumer {
    fn name(&self) -> &'static str {
        "sandbox-kill-consumer"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let jobs: Vec<QueuedJob> = match self.queue.claim(QueueName::ScaleboxKill, BATCH_SIZE, LEASE).await {
                Ok(jobs) => jobs,
                Err(error) => {
                    tracing::error!(%error, "failed to claim sandbox kill jobs");
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
                        tracing::error!(job_id = %job.id, %error, "invalid sandbox kill payload, dropping");
                        let _ = self.queue.mark_failed(job.id, &error.to_string(), false).await;
                        continue;
                    }
                };
                tracing::info!(sandbox_id = %payload.sandbox_id, reason = ?payload.reason, "killing sandbox");
                crate::sandbox::processors::kill(
                    self.provider.as_ref(),
                    &payload.sandbox_id,
                    self.config.kill_retry_max_attempts,
                    self.config.kill_retry_interval,
                )
                .await;
                if let Err(error) = self.queue.mark_succeeded(job.id).await {
                    tracing::error!(job_id = %job.id, %error, "failed to mark sandbox kill job succeeded");
                }
            }
        }
    }
}
