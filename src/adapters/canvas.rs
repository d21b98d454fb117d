//! Canvas editor adapter (spec §1: "the canvas editor... only its interface
//! appears here").

use crate::common::entity_ids::CanvasId;
use crate::external::CanvasLookup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub struct HttpCanvasLookup {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCanvasLookup {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("CANVAS_SERVICE_BASE_URL")
            .context("CANVAS_SERVICE_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build canvas service HTTP client")?;
        Ok(Self { base_url, client })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .context("canvas service request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("canvas service error {status}: {body}");
        }
        response.json().await.context("invalid canvas service response")
    }
}

#[async_trait]
impl CanvasLookup for HttpCanvasLookup {
    async fn title(&self, canvas_id: &CanvasId) -> Result<String> {
        let body = self.get_json(&format!("/canvases/{canvas_id}")).await?;
        Ok(body
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("untitled workflow")
            .to_string())
    }

    async fn declared_variables(&self, canvas_id: &CanvasId) -> Result<Value> {
        self.get_json(&format!("/canvases/{canvas_id}/variables")).await
    }

    async fn canvas_data(&self, canvas_id: &CanvasId) -> Result<Value> {
        self.get_json(&format!("/canvases/{canvas_id}/data")).await
    }
}
