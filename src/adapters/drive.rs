//! Object-storage drive adapter (spec §4.7: "`driveService.batchCreate`").

use crate::common::entity_ids::{CanvasId, Uid};
use crate::external::{DriveService, RegisteredFile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

pub struct HttpDriveService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDriveService {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DRIVE_SERVICE_BASE_URL").context("DRIVE_SERVICE_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build drive service HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateRequest<'a> {
    uid: String,
    canvas_id: String,
    added_paths: &'a [String],
}

#[async_trait]
impl DriveService for HttpDriveService {
    async fn batch_create(&self, uid: &Uid, canvas_id: &CanvasId, added_paths: &[String]) -> Result<Vec<RegisteredFile>> {
        if added_paths.is_empty() {
            return Ok(Vec::new());
        }
        let request = BatchCreateRequest {
            uid: uid.to_string(),
            canvas_id: canvas_id.to_string(),
            added_paths,
        };
        let response = self
            .client
            .post(format!("{}/drive/batch-create", self.base_url))
            .json(&request)
            .send()
            .await
            .context("drive service request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("drive service error {status}: {body}");
        }
        response.json().await.context("invalid drive service response")
    }
}
