//! The scan-loop service (spec §4.2): ticks `ScheduleEngine::scan_tick` on
//! an interval, grounded in the teacher's `kernel/scheduled_tasks.rs`
//! scan-loop shape (see DESIGN.md).

use crate::schedule::ScheduleEngine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Service;

pub struct ScheduleScanner {
    engine: Arc<ScheduleEngine>,
    interval: Duration,
}

impl ScheduleScanner {
    pub fn new(engine: Arc<ScheduleEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl Service for ScheduleScanner {
    fn name(&self) -> &'static str {
        "schedule-scanner"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.engine.scan_tick().await {
                        tracing::error!(%error, "schedule scan tick failed");
                    }
                }
            }
        }
        Ok(())
    }
}
