//! Scalebox Execute Pipeline (spec §4.7, component C6): the ingress contract
//! (`execute`) plus the job processor (`executeCode`) that runs the nested
//! lock discipline from `execution::lock` around the sandbox pool and a
//! wrapper's `execute_code`.

use crate::common::entity_ids::{CanvasId, Uid};
use crate::config::SandboxConfig;
use crate::error::{ControlPlaneError, Result};
use crate::execution::lock::ExecuteLockGuard;
use crate::external::DriveService;
use crate::queue::{EnqueueOptions, JobQueue, QueueName};
use crate::sandbox::wrapper::{extract_error, CodeExecutionOutput, CodeRunParams, ExecutionContext};
use crate::sandbox::SandboxPool;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// `execute(user, request)` input (spec §4.7 ingress step 1).
pub struct ExecuteRequest {
    pub uid: Uid,
    pub canvas_id: CanvasId,
    pub params: CodeRunParams,
    pub s3_drive_path: String,
    pub version: Option<String>,
    pub parent_result_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub status: ExecuteStatus,
    pub exit_code: i32,
    pub error: Option<Value>,
    pub executor_output: CodeExecutionOutputWire,
    pub files: Vec<crate::external::RegisteredFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteStatus {
    Success,
    Failed,
}

/// Wire shape of `CodeExecutionOutput` after the ingress's truncation pass
/// (spec §4.7 step 4).
#[derive(Debug, Clone, Serialize)]
pub struct CodeExecutionOutputWire {
    pub stdout: String,
    pub stderr: String,
    pub log: Option<String>,
}

pub struct ScaleboxService {
    redis: ConnectionManager,
    pool: Arc<SandboxPool>,
    drive: Arc<dyn DriveService>,
    execute_queue: Arc<dyn JobQueue>,
    config: SandboxConfig,
}

impl ScaleboxService {
    pub fn new(
        redis: ConnectionManager,
        pool: Arc<SandboxPool>,
        drive: Arc<dyn DriveService>,
        execute_queue: Arc<dyn JobQueue>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            redis,
            pool,
            drive,
            execute_queue,
            config,
        }
    }

    /// Spec §4.7 ingress steps 1-2: validate and admission-control before
    /// the job is ever enqueued. `canvasId` itself is required by
    /// `ExecuteRequest`'s type, so only the provider API key and queue depth
    /// need a runtime check.
    pub async fn admit(&self, _request: &ExecuteRequest) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(ControlPlaneError::RequestParams(
                "no configured provider API key".to_string(),
            ));
        }
        if self.config.max_queue_size > 0 {
            let in_flight = self
                .execute_queue
                .count(
                    QueueName::ScaleboxExecute,
                    &[crate::queue::JobState::Waiting, crate::queue::JobState::Active],
                )
                .await
                .map_err(ControlPlaneError::Internal)?;
            if in_flight as u32 >= self.config.max_queue_size {
                return Err(ControlPlaneError::QueueOverloaded);
            }
        }
        Ok(())
    }

    /// Spec §4.7 step 3: enqueue the execute job. Returns the queue job id;
    /// the caller awaits completion via whatever `waitUntilFinished`-style
    /// mechanism the worker module wires up (a `tokio::sync::oneshot` keyed
    /// by job id, not modeled in this pipeline).
    pub async fn enqueue(&self, request: &ExecuteRequest) -> Result<uuid::Uuid> {
        self.admit(request).await?;
        let context = execution_context(request, &self.config.api_key);
        let payload = serde_json::json!({
            "params": { "code": request.params.code, "language": request.params.language },
            "context": {
                "uid": context.uid,
                "canvasId": context.canvas_id,
                "s3DrivePath": context.s3_drive_path,
                "version": context.version,
                "parentResultId": context.parent_result_id,
            },
        });
        let result = self
            .execute_queue
            .enqueue(QueueName::ScaleboxExecute, payload, EnqueueOptions::default())
            .await
            .map_err(ControlPlaneError::Internal)?;
        Ok(result.job_id())
    }

    /// Spec §4.7 steps 4-5: turns the raw `executeCode` output into the
    /// ingress's wire response, truncating stdout over `truncateOutput` and
    /// appending a `[WARN]` log line (step 4).
    pub fn finish(&self, output: CodeExecutionOutput, files: Vec<crate::external::RegisteredFile>) -> ExecuteResponse {
        build_response(output, files, self.config.truncate_output)
    }

    /// The job processor (spec §4.7 "Job processor (`executeCode`)"): runs
    /// the outer execute-lock, pool acquire/release, and inner sandbox-lock
    /// around a single wrapper execution. All locks and the pool release run
    /// on every exit path, including errors, via Rust's own unwind-on-`?`
    /// plus explicit `release` calls in both the success and error arms.
    pub async fn execute_code(
        &self,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<(CodeExecutionOutput, Vec<crate::external::RegisteredFile>)> {
        let outer = ExecuteLockGuard::acquire_outer(
            self.redis.clone(),
            &context.uid.to_string(),
            &context.canvas_id.to_string(),
            &self.config,
        )
        .await?;

        let result = self.execute_with_pool(params, context).await;
        outer.release().await;
        result
    }

    async fn execute_with_pool(
        &self,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<(CodeExecutionOutput, Vec<crate::external::RegisteredFile>)> {
        let wrapper = self.pool.acquire().await?;
        let result = self.execute_with_sandbox_lock(wrapper.as_ref(), params, context).await;

        if let Err(error) = self.pool.release(wrapper).await {
            tracing::warn!(%error, "sandbox release failed after execution");
        }
        result
    }

    async fn execute_with_sandbox_lock(
        &self,
        wrapper: &dyn crate::sandbox::wrapper::ISandboxWrapper,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<(CodeExecutionOutput, Vec<crate::external::RegisteredFile>)> {
        let inner = ExecuteLockGuard::acquire_inner(self.redis.clone(), wrapper.sandbox_id(), &self.config).await?;

        let output = wrapper.execute_code(params, context).await;
        inner.release().await;

        let output = output?;
        let files = self
            .drive
            .batch_create(&context.uid, &context.canvas_id, &output.diff_added)
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(%error, "drive batch_create failed, returning execution without registered files");
                Vec::new()
            });
        Ok((output, files))
    }
}

fn execution_context(request: &ExecuteRequest, api_key: &str) -> ExecutionContext {
    ExecutionContext {
        uid: request.uid,
        canvas_id: request.canvas_id,
        api_key: api_key.to_string(),
        s3_drive_path: request.s3_drive_path.clone(),
        version: request.version.clone(),
        parent_result_id: request.parent_result_id.clone(),
    }
}

fn build_response(mut output: CodeExecutionOutput, files: Vec<crate::external::RegisteredFile>, truncate_output: usize) -> ExecuteResponse {
    let mut log = output.log.clone();
    if output.stdout.chars().count() > truncate_output {
        let truncated: String = output.stdout.chars().take(truncate_output).collect();
        output.stdout = truncated;
        let warning = format!("[WARN] output truncated at {truncate_output} characters");
        log = Some(match log {
            Some(existing) => format!("{existing}\n{warning}"),
            None => warning,
        });
    }

    // spec §4.7 step 5 / §7: a non-zero exitCode is a *code-level* error and
    // still reports `status=success` with the error carried alongside the
    // exit code; `status=failed` is reserved for system-level failures,
    // which surface as an `Err` out of `execute_code` before this point is
    // ever reached.
    let error = extract_error(&output);
    ExecuteResponse {
        status: ExecuteStatus::Success,
        exit_code: output.exit_code.unwrap_or(0),
        error,
        executor_output: CodeExecutionOutputWire {
            stdout: output.stdout,
            stderr: output.stderr,
            log,
        },
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_response_reports_success_with_carried_error_on_nonzero_exit_code() {
        let output = CodeExecutionOutput {
            exit_code: Some(1),
            stderr: "boom".into(),
            ..Default::default()
        };
        let response = build_response(output, Vec::new(), 10_000);
        assert_eq!(response.status, ExecuteStatus::Success);
        assert_eq!(response.exit_code, 1);
        assert_eq!(response.error.unwrap()["message"], "boom");
    }

    #[test]
    fn build_response_truncates_long_stdout_and_appends_warning() {
        let output = CodeExecutionOutput {
            exit_code: Some(0),
            stdout: "0123456789".into(),
            ..Default::default()
        };
        let response = build_response(output, Vec::new(), 5);
        assert_eq!(response.executor_output.stdout, "01234");
        assert!(response.executor_output.log.unwrap().contains("[WARN]"));
    }
}
