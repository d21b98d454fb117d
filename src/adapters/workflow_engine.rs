//! Workflow engine adapter (spec §1: "we invoke it as `executeFromCanvasData`").

use crate::common::entity_ids::Uid;
use crate::external::{WorkflowEngineClient, WorkflowRunOutcome, WorkflowTriggerContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub struct HttpWorkflowEngineClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWorkflowEngineClient {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("WORKFLOW_ENGINE_BASE_URL")
            .context("WORKFLOW_ENGINE_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("failed to build workflow engine HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteFromCanvasDataRequest<'a> {
    uid: String,
    canvas_data: &'a Value,
    variables: &'a Value,
    schedule_id: Option<String>,
    schedule_record_id: Option<String>,
    trigger_type: &'static str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteFromCanvasDataResponse {
    execution_canvas_id: String,
    workflow_execution_id: String,
}

#[async_trait]
impl WorkflowEngineClient for HttpWorkflowEngineClient {
    async fn execute_from_canvas_data(
        &self,
        uid: &Uid,
        canvas_data: &Value,
        variables: &Value,
        context: WorkflowTriggerContext,
    ) -> Result<WorkflowRunOutcome> {
        let trigger_type = match context.trigger_type {
            crate::external::TriggerType::Cron => "cron",
            crate::external::TriggerType::Webhook => "webhook",
            crate::external::TriggerType::Api => "api",
            crate::external::TriggerType::Manual => "manual",
        };
        let request = ExecuteFromCanvasDataRequest {
            uid: uid.to_string(),
            canvas_data,
            variables,
            schedule_id: context.schedule_id.map(|id| id.to_string()),
            schedule_record_id: context.schedule_record_id.map(|id| id.to_string()),
            trigger_type,
        };

        let response = self
            .client
            .post(format!("{}/workflows/execute-from-canvas-data", self.base_url))
            .json(&request)
            .send()
            .await
            .context("workflow engine request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("workflow engine error {status}: {body}");
        }

        let body: ExecuteFromCanvasDataResponse =
            response.json().await.context("invalid workflow engine response")?;
        Ok(WorkflowRunOutcome {
            execution_canvas_id: body.execution_canvas_id.parse().context("invalid executionCanvasId")?,
            workflow_execution_id: body
                .workflow_execution_id
                .parse()
                .context("invalid workflowExecutionId")?,
        })
    }
}
