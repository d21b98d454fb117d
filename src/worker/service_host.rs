//! The `Service`/`ServiceHost` convention the teacher's `kernel/jobs/worker.rs`
//! references (`impl Service for JobWorker`) but never defines in the
//! retrieval pack — implemented here for real since this crate must
//! actually compile and run its background tasks.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A long-running background task that cooperatively exits once `shutdown`
/// is cancelled. Mirrors the teacher's `impl Service for JobWorker` shape
/// (`name()` for logging, `run(self: Box<Self>, shutdown)` as the entry
/// point) without the rest of that repo's domain-specific job dispatch.
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}

/// Spawns every service as its own task under `shutdown`, logging start/stop
/// and any terminal error. Returns the join handles so the caller can await
/// them during graceful shutdown (spec `[AMBIENT] Graceful shutdown`).
pub fn run_until_shutdown(
    services: Vec<Box<dyn Service>>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    services
        .into_iter()
        .map(|service| {
            let shutdown = shutdown.clone();
            let name = service.name();
            tokio::spawn(async move {
                info!(service = name, "service starting");
                if let Err(error) = service.run(shutdown).await {
                    error!(service = name, %error, "service exited with error");
                } else {
                    info!(service = name, "service stopped");
                }
            })
        })
        .collect()
}
