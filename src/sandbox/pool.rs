//! Sandbox Pool (spec §4.5, component C5): idle-sandbox reuse, a capacity
//! cap on total live sandboxes, schedule/cancel auto-pause, and fire-and-
//! forget kill. Grounded in the reference monorepo's `kernel/jobs/worker.rs`
//! `JobWorker` lifecycle/heartbeat shape, generalized from job-claim
//! bookkeeping to sandbox acquire/release bookkeeping (see DESIGN.md).

use super::executor_wrapper::ExecutorWrapper;
use super::interpreter_wrapper::InterpreterWrapper;
use super::metadata::{self, SandboxMetadata};
use super::provider::{CreateSandboxOptions, SandboxProvider};
use super::wrapper::{with_lifecycle_retry, ISandboxWrapper};
use crate::config::{SandboxConfig, WrapperType};
use crate::error::{ControlPlaneError, Result};
use crate::queue::{EnqueueOptions, JobQueue, Priority, QueueName};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

const SANDBOX_COUNT_KEY: &str = "scalebox:count";

fn idle_key(template_name: &str) -> String {
    format!("scalebox:idle:{template_name}")
}

fn pause_job_id(sandbox_id: &str) -> String {
    format!("pause:{sandbox_id}")
}

pub struct SandboxPool {
    redis: ConnectionManager,
    provider: Arc<dyn SandboxProvider>,
    pause_queue: Arc<dyn JobQueue>,
    kill_queue: Arc<dyn JobQueue>,
    config: SandboxConfig,
}

impl SandboxPool {
    pub fn new(
        redis: ConnectionManager,
        provider: Arc<dyn SandboxProvider>,
        pause_queue: Arc<dyn JobQueue>,
        kill_queue: Arc<dyn JobQueue>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            redis,
            provider,
            pause_queue,
            kill_queue,
            config,
        }
    }

    fn build_wrapper(&self, sandbox_id: String, cwd: String) -> Box<dyn ISandboxWrapper> {
        match self.config.wrapper_type {
            WrapperType::Executor => Box::new(ExecutorWrapper::new(
                sandbox_id,
                self.provider.clone(),
                self.config.code_size_threshold,
                self.config.run_code_timeout,
            )),
            WrapperType::Interpreter => {
                Box::new(InterpreterWrapper::new(sandbox_id, self.provider.clone(), cwd))
            }
        }
    }

    /// Spec §4.5 `acquire(context) → SandboxWrapper`.
    pub async fn acquire(&self) -> Result<Box<dyn ISandboxWrapper>> {
        let mut conn = self.redis.clone();
        let key = idle_key(&self.config.template_name);

        if let Some(sandbox_id) = self.pop_idle(&mut conn, &key).await? {
            match self.reuse_idle(&mut conn, &sandbox_id).await {
                Ok(wrapper) => return Ok(wrapper),
                Err(error) => {
                    tracing::warn!(%sandbox_id, %error, "idle sandbox reconnect failed, deleting metadata and creating fresh");
                    self.delete_metadata(&mut conn, &sandbox_id).await;
                    self.enqueue_kill(&sandbox_id, &error.to_string()).await;
                }
            }
        }

        self.create_fresh(&mut conn).await
    }

    async fn pop_idle(&self, conn: &mut ConnectionManager, key: &str) -> Result<Option<String>> {
        let sandbox_id: Option<String> = conn
            .lpop(key, None)
            .await
            .map_err(|e| ControlPlaneError::Internal(e.into()))?;
        Ok(sandbox_id)
    }

    async fn reuse_idle(&self, conn: &mut ConnectionManager, sandbox_id: &str) -> anyhow::Result<Box<dyn ISandboxWrapper>> {
        // Spec §4.5 step 2: "cancel any pending auto-pause job" before
        // reconnecting, so a concurrent pause can't race the reconnect.
        self.cancel_pending_pause(sandbox_id).await;

        let mut metadata = self
            .load_metadata(conn, sandbox_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no metadata for idle sandbox {sandbox_id}"))?;

        let on_failed = |_: &anyhow::Error| {};
        let handle = with_lifecycle_retry(
            "reconnect",
            self.config.lifecycle_retry_max_attempts,
            self.config.lifecycle_retry_interval,
            || {
                let provider = self.provider.clone();
                let sandbox_id = sandbox_id.to_string();
                async move { provider.connect(&sandbox_id).await }
            },
            on_failed,
        )
        .await?;

        let wrapper = self.build_wrapper(handle.sandbox_id.clone(), handle.cwd.clone());
        wrapper.health_check().await?;

        metadata.mark_running();
        self.save_metadata(conn, &metadata).await?;
        Ok(wrapper)
    }

    async fn create_fresh(&self, conn: &mut ConnectionManager) -> Result<Box<dyn ISandboxWrapper>> {
        let count: u32 = conn
            .get(SANDBOX_COUNT_KEY)
            .await
            .map_err(|e| ControlPlaneError::Internal(e.into()))?
            .unwrap_or(0);
        if count >= self.config.max_sandboxes {
            return Err(ControlPlaneError::SandboxCreation(
                "resource limit exceeded".to_string(),
            ));
        }

        let options = CreateSandboxOptions {
            template_name: self.config.template_name.clone(),
            timeout: self.config.sandbox_timeout,
        };
        let create_result = with_lifecycle_retry(
            "create",
            self.config.lifecycle_retry_max_attempts,
            self.config.lifecycle_retry_interval,
            || {
                let provider = self.provider.clone();
                let options = options.clone();
                async move { provider.create(&options).await }
            },
            |_| {},
        )
        .await;

        let handle = match create_result {
            Ok(handle) => handle,
            Err(error) => {
                self.enqueue_kill("unknown", &error.to_string()).await;
                return Err(error);
            }
        };

        let _: () = conn
            .incr(SANDBOX_COUNT_KEY, 1)
            .await
            .map_err(|e| ControlPlaneError::Internal(e.into()))?;

        let metadata = SandboxMetadata::new_running(handle.sandbox_id.clone(), handle.cwd.clone());
        self.save_metadata(conn, &metadata).await.map_err(|e| {
            ControlPlaneError::Internal(e)
        })?;

        Ok(self.build_wrapper(handle.sandbox_id, handle.cwd))
    }

    /// Spec §4.5 `release(wrapper)`.
    pub async fn release(&self, wrapper: Box<dyn ISandboxWrapper>) -> Result<()> {
        let mut conn = self.redis.clone();
        let sandbox_id = wrapper.sandbox_id().to_string();

        let result: anyhow::Result<()> = async {
            let mut metadata = self
                .load_metadata(&mut conn, &sandbox_id)
                .await?
                .unwrap_or_else(|| SandboxMetadata::new_running(sandbox_id.clone(), String::new()));
            metadata.mark_idle(crate::common::time::now());
            self.save_metadata(&mut conn, &metadata).await?;

            let key = idle_key(&self.config.template_name);
            let _: () = conn.lpush(&key, &sandbox_id).await?;
            Ok(())
        }
        .await;

        if let Err(error) = result {
            tracing::warn!(%sandbox_id, %error, "release failed, deleting metadata best-effort");
            self.delete_metadata(&mut conn, &sandbox_id).await;
            return Err(ControlPlaneError::Internal(error));
        }

        self.schedule_auto_pause(&sandbox_id).await;
        Ok(())
    }

    /// Spec §4.5 step 2 (release): `jobId = pause:{sandboxId}` coalesces
    /// duplicate schedules (spec scenario 6: "If a subsequent request
    /// arrives before delay, the pause is cancelled again").
    async fn schedule_auto_pause(&self, sandbox_id: &str) {
        let payload = serde_json::json!({ "sandboxId": sandbox_id });
        let options = EnqueueOptions {
            job_id: Some(pause_job_id(sandbox_id)),
            priority: Priority::LOWEST,
            delay: Some(self.config.auto_pause_delay),
            max_attempts: 1,
        };
        if let Err(error) = self.pause_queue.enqueue(QueueName::ScaleboxPause, payload, options).await {
            tracing::warn!(%sandbox_id, %error, "failed to schedule auto-pause");
        }
    }

    async fn cancel_pending_pause(&self, sandbox_id: &str) {
        let job_id = pause_job_id(sandbox_id);
        let jobs = match self
            .pause_queue
            .get_jobs(QueueName::ScaleboxPause, &[crate::queue::JobState::Waiting, crate::queue::JobState::Delayed])
            .await
        {
            Ok(jobs) => jobs,
            Err(error) => {
                tracing::warn!(%sandbox_id, %error, "failed to list pending pause jobs");
                return;
            }
        };
        for job in jobs {
            if job.job_id.as_deref() == Some(job_id.as_str()) {
                if let Err(error) = self.pause_queue.remove(job.id).await {
                    tracing::warn!(%sandbox_id, %error, "failed to cancel pending pause job");
                }
            }
        }
    }

    /// Spec §4.5 step 5: "enqueue an async kill task labelled with the first
    /// 50 chars of the error message."
    async fn enqueue_kill(&self, sandbox_id: &str, error_message: &str) {
        let label: String = error_message.chars().take(50).collect();
        let payload = serde_json::json!({ "sandboxId": sandbox_id, "reason": label });
        if let Err(error) = self
            .kill_queue
            .enqueue(QueueName::ScaleboxKill, payload, EnqueueOptions::default())
            .await
        {
            tracing::error!(%sandbox_id, %error, "failed to enqueue kill task");
        }
    }

    async fn load_metadata(&self, conn: &mut ConnectionManager, sandbox_id: &str) -> anyhow::Result<Option<SandboxMetadata>> {
        let raw: Option<String> = conn.get(metadata::redis_key(sandbox_id)).await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn save_metadata(&self, conn: &mut ConnectionManager, metadata: &SandboxMetadata) -> anyhow::Result<()> {
        let payload = serde_json::to_string(metadata)?;
        let _: () = conn.set(metadata::redis_key(&metadata.sandbox_id), payload).await?;
        Ok(())
    }

    async fn delete_metadata(&self, conn: &mut ConnectionManager, sandbox_id: &str) {
        let _: Result<(), _> = conn.del(metadata::redis_key(sandbox_id)).await;
        let _: Result<(), _> = conn.decr(SANDBOX_COUNT_KEY, 1).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_key_matches_spec_convention() {
        assert_eq!(idle_key("refly-executor-slim"), "scalebox:idle:refly-executor-slim");
    }

    #[test]
    fn pause_job_id_matches_spec_convention() {
        assert_eq!(pause_job_id("sbx_1"), "pause:sbx_1");
    }
}
