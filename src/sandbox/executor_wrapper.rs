//! Executor wrapper (spec §4.7, preferred/custom-template variant): writes S3
//! credentials inside the sandbox, encodes params as JSON, streams them to
//! the executor binary's stdin via a shell command, and parses the *last*
//! line of stdout as JSON.

use super::provider::SandboxProvider;
use super::wrapper::{CodeExecutionOutput, CodeRunParams, ExecutionContext, ISandboxWrapper};
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;

pub struct ExecutorWrapper {
    sandbox_id: String,
    provider: Arc<dyn SandboxProvider>,
    code_size_threshold: usize,
    run_timeout: std::time::Duration,
}

impl ExecutorWrapper {
    pub fn new(
        sandbox_id: String,
        provider: Arc<dyn SandboxProvider>,
        code_size_threshold: usize,
        run_timeout: std::time::Duration,
    ) -> Self {
        Self {
            sandbox_id,
            provider,
            code_size_threshold,
            run_timeout,
        }
    }

    async fn write_s3_credentials(&self, context: &ExecutionContext) -> anyhow::Result<()> {
        let creds = serde_json::json!({
            "apiKey": context.api_key,
            "drivePath": context.s3_drive_path,
        });
        self.provider
            .write_file(&self.sandbox_id, "/tmp/s3_credentials.json", creds.to_string().as_bytes())
            .await
    }

    /// Spec §4.7: "For code larger than codeSizeThreshold, writes the source
    /// to /tmp/code_script and passes path mode with delete=true; else
    /// base64-encodes inline."
    async fn encode_code(&self, params: &CodeRunParams) -> anyhow::Result<serde_json::Value> {
        if params.code.len() > self.code_size_threshold {
            self.provider
                .write_file(&self.sandbox_id, "/tmp/code_script", params.code.as_bytes())
                .await?;
            Ok(serde_json::json!({
                "mode": "path",
                "path": "/tmp/code_script",
                "delete": true,
                "language": params.language,
            }))
        } else {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&params.code);
            Ok(serde_json::json!({
                "mode": "inline",
                "code": encoded,
                "language": params.language,
            }))
        }
    }

    /// Parses the *last* line of stdout as JSON (spec §4.7): the executor
    /// binary may emit diagnostic lines before its final result line.
    fn parse_last_json_line(stdout: &str) -> Result<CodeExecutionOutput> {
        let last_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| {
                ControlPlaneError::SandboxExecutionFailed("executor produced no output".to_string())
            })?;
        let value: serde_json::Value = serde_json::from_str(last_line).map_err(|e| {
            ControlPlaneError::SandboxExecutionFailed(format!("malformed executor output: {e}"))
        })?;
        Ok(CodeExecutionOutput {
            exit_code: value.get("exitCode").and_then(|v| v.as_i64()).map(|v| v as i32),
            stdout: value
                .get("stdout")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            stderr: value
                .get("stderr")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            error: value.get("error").and_then(|v| v.as_str()).map(str::to_string),
            log: value.get("log").and_then(|v| v.as_str()).map(str::to_string),
            diff_added: value
                .get("diff")
                .and_then(|d| d.get("added"))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ISandboxWrapper for ExecutorWrapper {
    fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    async fn health_check(&self) -> Result<()> {
        let result = self
            .provider
            .run_command(&self.sandbox_id, "refly-executor-slim --version", None)
            .await
            .map_err(|e| ControlPlaneError::SandboxConnection(e.to_string()))?;
        if result.exit_code.unwrap_or(1) != 0 {
            return Err(ControlPlaneError::SandboxConnection(
                "executor health check failed".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute_code(
        &self,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<CodeExecutionOutput> {
        self.write_s3_credentials(context)
            .await
            .map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()))?;
        let payload = self
            .encode_code(params)
            .await
            .map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()))?;
        let stdin = serde_json::to_vec(&payload)
            .map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()))?;

        let run = tokio::time::timeout(
            self.run_timeout,
            self.provider
                .run_command(&self.sandbox_id, "refly-executor-slim", Some(&stdin)),
        )
        .await
        .map_err(|_| ControlPlaneError::SandboxExecutionFailed("run code timed out".to_string()))?
        .map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()))?;

        Self::parse_last_json_line(&run.stdout)
    }

    async fn pause(&self) -> Result<()> {
        self.provider
            .beta_pause(&self.sandbox_id)
            .await
            .map_err(|e| ControlPlaneError::SandboxLifecycle(e.to_string()))
    }

    async fn kill(&self) -> Result<()> {
        self.provider
            .kill(&self.sandbox_id)
            .await
            .map_err(|e| ControlPlaneError::SandboxLifecycle(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_last_json_line_picks_final_nonblank_line() {
        let stdout = "warming up\nloading deps\n{\"exitCode\":0,\"stdout\":\"hi\",\"stderr\":\"\"}\n";
        let output = ExecutorWrapper::parse_last_json_line(stdout).unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "hi");
    }

    #[test]
    fn parse_last_json_line_extracts_diff_added() {
        let stdout = r#"{"exitCode":0,"stdout":"","stderr":"","diff":{"added":["a.txt","b.txt"]}}"#;
        let output = ExecutorWrapper::parse_last_json_line(stdout).unwrap();
        assert_eq!(output.diff_added, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn parse_last_json_line_errors_on_empty_stdout() {
        assert!(ExecutorWrapper::parse_last_json_line("   \n  \n").is_err());
    }
}
