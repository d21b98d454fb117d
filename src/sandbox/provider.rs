//! The remote sandbox provider SDK boundary (spec §1 Non-goals: "sandbox
//! create/kill/pause/run are remote calls to an external service" — we
//! specify only the interface). Grounded in `src/external.rs`'s framing of
//! out-of-scope collaborators as traits this crate depends on, never
//! implements.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CreateSandboxOptions {
    pub template_name: String,
    pub timeout: std::time::Duration,
}

/// A live handle returned by the provider SDK on create/connect. Opaque to
/// this crate beyond the sandbox id and working directory it reports.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub sandbox_id: String,
    pub cwd: String,
}

#[derive(Debug, Clone)]
pub struct RunCodeResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// The provider SDK adapter (spec §2 L3). Two concrete wrappers
/// (`ExecutorWrapper`, `InterpreterWrapper`) use this to reach the remote
/// sandbox; it is never used directly by the pool, which only ever talks to
/// an `ISandboxWrapper`.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, options: &CreateSandboxOptions) -> anyhow::Result<ProviderHandle>;
    async fn connect(&self, sandbox_id: &str) -> anyhow::Result<ProviderHandle>;
    async fn kill(&self, sandbox_id: &str) -> anyhow::Result<()>;
    /// `betaPause()` (spec §4.5 auto-pause processor).
    async fn beta_pause(&self, sandbox_id: &str) -> anyhow::Result<()>;
    /// Streams a shell command's stdin/stdout against a live sandbox; used by
    /// the executor wrapper to talk to the executor binary and by the health
    /// check (spec §4.7: "Health check runs `refly-executor-slim --version`").
    async fn run_command(&self, sandbox_id: &str, command: &str, stdin: Option<&[u8]>) -> anyhow::Result<RunCodeResult>;
    /// The interpreter wrapper's direct `runCode(code, {language, cwd})` path
    /// (spec §4.7 "Interpreter wrapper").
    async fn run_code(&self, sandbox_id: &str, code: &str, language: &str, cwd: &str) -> anyhow::Result<RunCodeResult>;
    /// Lists entries in `cwd`, used by the interpreter wrapper's
    /// before/after diffing strategy (spec §4.7).
    async fn list_dir(&self, sandbox_id: &str, cwd: &str) -> anyhow::Result<Vec<String>>;
    /// Writes a file inside the sandbox (S3 credential files, `/tmp/code_script`).
    async fn write_file(&self, sandbox_id: &str, path: &str, contents: &[u8]) -> anyhow::Result<()>;
}

/// Wraps arbitrary provider-reported errors for a crate-level value, used
/// where a specific error taxonomy variant can't yet be determined.
pub fn provider_error_context(context: &str, error: anyhow::Error) -> anyhow::Error {
    error.context(context.to_string())
}

pub type ProviderJson = Value;
