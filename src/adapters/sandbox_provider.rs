//! Sandbox provider SDK adapter (spec §1 Non-goals: "sandbox create/kill/
//! pause/run are remote calls to an external service"). `reqwest` is kept in
//! Cargo.toml specifically for this client (see its dependency comment).

use crate::sandbox::provider::{CreateSandboxOptions, ProviderHandle, RunCodeResult, SandboxProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub struct HttpSandboxProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSandboxProvider {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build sandbox provider HTTP client")?;
        Ok(Self { base_url, api_key, client })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
    }
}

#[derive(Deserialize)]
struct HandleResponse {
    sandbox_id: String,
    cwd: String,
}

impl From<HandleResponse> for ProviderHandle {
    fn from(r: HandleResponse) -> Self {
        Self { sandbox_id: r.sandbox_id, cwd: r.cwd }
    }
}

#[derive(Deserialize)]
struct RunResponse {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl From<RunResponse> for RunCodeResult {
    fn from(r: RunResponse) -> Self {
        Self { exit_code: r.exit_code, stdout: r.stdout, stderr: r.stderr }
    }
}

async fn ensure_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{context} failed with {status}: {body}");
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, options: &CreateSandboxOptions) -> Result<ProviderHandle> {
        #[derive(Serialize)]
        struct CreateRequest<'a> {
            template_name: &'a str,
            timeout_secs: u64,
        }
        let response = self
            .request(reqwest::Method::POST, "/sandboxes")
            .json(&CreateRequest {
                template_name: &options.template_name,
                timeout_secs: options.timeout.as_secs(),
            })
            .send()
            .await
            .context("sandbox create request failed")?;
        let response = ensure_success(response, "sandbox create").await?;
        Ok(response.json::<HandleResponse>().await.context("invalid create response")?.into())
    }

    async fn connect(&self, sandbox_id: &str) -> Result<ProviderHandle> {
        let response = self
            .request(reqwest::Method::GET, &format!("/sandboxes/{sandbox_id}"))
            .send()
            .await
            .context("sandbox connect request failed")?;
        let response = ensure_success(response, "sandbox connect").await?;
        Ok(response.json::<HandleResponse>().await.context("invalid connect response")?.into())
    }

    async fn kill(&self, sandbox_id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/sandboxes/{sandbox_id}"))
            .send()
            .await
            .context("sandbox kill request failed")?;
        ensure_success(response, "sandbox kill").await?;
        Ok(())
    }

    async fn beta_pause(&self, sandbox_id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, &format!("/sandboxes/{sandbox_id}/pause"))
            .send()
            .await
            .context("sandbox pause request failed")?;
        ensure_success(response, "sandbox pause").await?;
        Ok(())
    }

    async fn run_command(&self, sandbox_id: &str, command: &str, stdin: Option<&[u8]>) -> Result<RunCodeResult> {
        #[derive(Serialize)]
        struct RunCommandRequest<'a> {
            command: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            stdin_base64: Option<String>,
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/sandboxes/{sandbox_id}/run-command"))
            .json(&RunCommandRequest {
                command,
                stdin_base64: stdin.map(|b| base64::engine::general_purpose::STANDARD.encode(b)),
            })
            .send()
            .await
            .context("sandbox run-command request failed")?;
        let response = ensure_success(response, "sandbox run-command").await?;
        Ok(response.json::<RunResponse>().await.context("invalid run-command response")?.into())
    }

    async fn run_code(&self, sandbox_id: &str, code: &str, language: &str, cwd: &str) -> Result<RunCodeResult> {
        #[derive(Serialize)]
        struct RunCodeRequest<'a> {
            code: &'a str,
            language: &'a str,
            cwd: &'a str,
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/sandboxes/{sandbox_id}/run-code"))
            .json(&RunCodeRequest { code, language, cwd })
            .send()
            .await
            .context("sandbox run-code request failed")?;
        let response = ensure_success(response, "sandbox run-code").await?;
        Ok(response.json::<RunResponse>().await.context("invalid run-code response")?.into())
    }

    async fn list_dir(&self, sandbox_id: &str, cwd: &str) -> Result<Vec<String>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/sandboxes/{sandbox_id}/list-dir"))
            .query(&[("cwd", cwd)])
            .send()
            .await
            .context("sandbox list-dir request failed")?;
        let response = ensure_success(response, "sandbox list-dir").await?;
        response.json().await.context("invalid list-dir response")
    }

    async fn write_file(&self, sandbox_id: &str, path: &str, contents: &[u8]) -> Result<()> {
        #[derive(Serialize)]
        struct WriteFileRequest<'a> {
            path: &'a str,
            contents_base64: String,
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/sandboxes/{sandbox_id}/write-file"))
            .json(&WriteFileRequest {
                path,
                contents_base64: base64::engine::general_purpose::STANDARD.encode(contents),
            })
            .send()
            .await
            .context("sandbox write-file request failed")?;
        ensure_success(response, "sandbox write-file").await?;
        Ok(())
    }
}
