//! Interpreter wrapper (spec §4.7, hosted-template fallback variant): mounts
//! S3 via `s3fs` as a nested defer (unmount via `fusermount -u -z` on exit),
//! snapshots the cwd listing before execution and diffs after to produce
//! `diff.added`, and calls the provider's `runCode(code, {language, cwd})`
//! directly instead of shelling out to an executor binary.

use super::provider::SandboxProvider;
use super::wrapper::{CodeExecutionOutput, CodeRunParams, ExecutionContext, ISandboxWrapper};
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub struct InterpreterWrapper {
    sandbox_id: String,
    provider: Arc<dyn SandboxProvider>,
    cwd: String,
}

impl InterpreterWrapper {
    pub fn new(sandbox_id: String, provider: Arc<dyn SandboxProvider>, cwd: String) -> Self {
        Self {
            sandbox_id,
            provider,
            cwd,
        }
    }

    async fn mount_s3(&self, context: &ExecutionContext) -> anyhow::Result<()> {
        let mount_cmd = format!(
            "s3fs {} {} -o passwd_file=/tmp/.passwd-s3fs",
            context.s3_drive_path, self.cwd
        );
        self.provider
            .run_command(&self.sandbox_id, &mount_cmd, None)
            .await?;
        Ok(())
    }

    /// "Nested defer" unmount (spec §4.7): run regardless of whether
    /// execution above succeeded, errors here are logged, not propagated,
    /// since the caller's own error (if any) takes precedence.
    async fn unmount_s3(&self) {
        let unmount_cmd = format!("fusermount -u -z {}", self.cwd);
        if let Err(error) = self.provider.run_command(&self.sandbox_id, &unmount_cmd, None).await {
            tracing::warn!(sandbox_id = %self.sandbox_id, %error, "failed to unmount s3fs, leaking mount");
        }
    }

    async fn snapshot_cwd(&self) -> anyhow::Result<HashSet<String>> {
        let entries = self.provider.list_dir(&self.sandbox_id, &self.cwd).await?;
        Ok(entries.into_iter().collect())
    }
}

#[async_trait]
impl ISandboxWrapper for InterpreterWrapper {
    fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    async fn health_check(&self) -> Result<()> {
        self.provider
            .list_dir(&self.sandbox_id, &self.cwd)
            .await
            .map(|_| ())
            .map_err(|e| ControlPlaneError::SandboxConnection(e.to_string()))
    }

    async fn execute_code(
        &self,
        params: &CodeRunParams,
        context: &ExecutionContext,
    ) -> Result<CodeExecutionOutput> {
        self.mount_s3(context)
            .await
            .map_err(|e| ControlPlaneError::SandboxMount(e.to_string()))?;

        let before = self
            .snapshot_cwd()
            .await
            .map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()));
        let run = self
            .provider
            .run_code(&self.sandbox_id, &params.code, &params.language, &self.cwd)
            .await;
        let after = self.snapshot_cwd().await;

        self.unmount_s3().await;

        let before = before?;
        let run = run.map_err(|e| ControlPlaneError::SandboxExecutionFailed(e.to_string()))?;
        let diff_added = match after {
            Ok(after) => {
                let mut added: Vec<String> = after.difference(&before).cloned().collect();
                added.sort();
                added
            }
            Err(error) => {
                tracing::warn!(sandbox_id = %self.sandbox_id, %error, "failed to snapshot cwd after execution");
                Vec::new()
            }
        };

        Ok(CodeExecutionOutput {
            exit_code: run.exit_code,
            stdout: run.stdout,
            stderr: run.stderr,
            error: None,
            log: None,
            diff_added,
        })
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
    fn diff_added_is_the_set_difference_sorted() {
        let before: HashSet<String> = ["a.txt", "b.txt"].into_iter().map(String::from).collect();
        let after: HashSet<String> = ["a.txt", "b.txt", "c.txt", "d.txt"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut added: Vec<String> = after.difference(&before).cloned().collect();
        added.sort();
        assert_eq!(added, vec!["c.txt".to_string(), "d.txt".to_string()]);
    }
}
