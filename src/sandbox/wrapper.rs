//! `ISandboxWrapper` (spec §4.7, §9 "Dynamic dispatch over sandbox provider
//! variants"): the local adapter object owning a sandbox handle. Two
//! concrete implementations — `ExecutorWrapper` and `InterpreterWrapper` —
//! differ in execution path and mount strategy and share no implementation
//! inheritance, only this trait, per spec §9's explicit guidance.

use crate::common::entity_ids::{CanvasId, Uid};
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub uid: Uid,
    pub canvas_id: CanvasId,
    pub api_key: String,
    pub s3_drive_path: String,
    pub version: Option<String>,
    pub parent_result_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodeRunParams {
    pub code: String,
    pub language: String,
}

/// The executor binary's/interpreter's parsed stdout: `{exitCode, stdout,
/// stderr, error, log, diff.added}` (spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct CodeExecutionOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub log: Option<String>,
    pub diff_added: Vec<String>,
}

#[async_trait]
pub trait ISandboxWrapper: Send + Sync {
    fn sandbox_id(&self) -> &str;

    /// Runs `refly-executor-slim --version` (executor) or an equivalent
    /// liveness probe (interpreter) against a freshly reconnected sandbox
    /// (spec §4.5 acquire step 2).
    async fn health_check(&self) -> Result<()>;

    async fn execute_code(
        &self,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<CodeExecutionOutput>;

    /// Interpreter wrapper's `betaPause()` passthrough; executor wrapper
    /// delegates straight to the pool's auto-pause processor instead since
    /// pausing is provider-level, not wrapper-level, for that variant.
    async fn pause(&self) -> Result<()>;

    async fn kill(&self) -> Result<()>;
}

/// `withLifecycleRetry` (spec §4.7): retries `op` up to `max_attempts` with a
/// fixed delay; calls `on_failed` with the final error so the pool can
/// enqueue a kill (spec §4.5 step 5).
pub async fn with_lifecycle_retry<F, Fut, T>(
    op_name: &str,
    max_attempts: u32,
    delay: Duration,
    mut f: F,
    on_failed: impl FnOnce(&anyhow::Error),
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                tracing::warn!(op = op_name, attempt, %error, "sandbox lifecycle op failed, retrying");
                last_error = Some(error);
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }
    let error = last_error.unwrap_or_else(|| anyhow::anyhow!("{op_name} failed with no recorded error"));
    on_failed(&error);
    Err(ControlPlaneError::SandboxLifecycle(format!("{op_name}: {error}")))
}

/// Extracts the code-level `{code, message}` error pair from a completed
/// output (spec §4.7 step 5, §7: "exitCode != 0 is a code error").
pub fn extract_error(output: &CodeExecutionOutput) -> Option<Value> {
    match output.exit_code {
        Some(0) | None => None,
        Some(code) => Some(serde_json::json!({
            "code": code,
            "message": output.error.clone().unwrap_or_else(|| output.stderr.clone()),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_lifecycle_retry_succeeds_without_retry_on_first_try() {
        let result: Result<i32> = with_lifecycle_retry(
            "create",
            3,
            Duration::from_millis(1),
            || async { Ok(42) },
            |_| panic!("on_failed should not run"),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn with_lifecycle_retry_exhausts_attempts_and_calls_on_failed() {
        let mut calls = 0;
        let called_on_failed = std::cell::Cell::new(false);
        let result: Result<i32> = with_lifecycle_retry(
            "create",
            3,
            Duration::from_millis(1),
            || {
                calls += 1;
                async move { Err(anyhow::anyhow!("boom")) }
            },
            |_| called_on_failed.set(true),
        )
        .await;
        assert!(result.is_err());
        assert!(called_on_failed.get());
    }

    #[test]
    fn extract_error_is_none_for_zero_exit_code() {
        let output = CodeExecutionOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(extract_error(&output).is_none());
    }

    #[test]
    fn extract_error_carries_code_and_stderr_fallback() {
        let output = CodeExecutionOutput {
            exit_code: Some(1),
            stderr: "traceback".into(),
            ..Default::default()
        };
        let error = extract_error(&output).unwrap();
        assert_eq!(error["code"], 1);
        assert_eq!(error["message"], "traceback");
    }
}
