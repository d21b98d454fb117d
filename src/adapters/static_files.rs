//! `StaticFile` lookup adapter (spec §4.4: "fetch `StaticFile` rows
//! (originalName, contentType)"). Object storage is out of scope (spec §1);
//! this reads the row's metadata only, not the blob.

use crate::variables::{StaticFileInfo, StaticFileLookup};
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct HttpStaticFileLookup {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStaticFileLookup {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("STATIC_FILES_BASE_URL").context("STATIC_FILES_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("failed to build static files HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl StaticFileLookup for HttpStaticFileLookup {
    async fn by_storage_key(&self, storage_key: &str) -> Result<Option<StaticFileInfo>> {
        let response = self
            .client
            .get(format!("{}/static-files/by-key", self.base_url))
            .query(&[("storageKey", storage_key)])
            .send()
            .await
            .context("static files service request failed")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("static files service error {status}: {body}");
        }
        Ok(Some(
            response.json().await.context("invalid static files service response")?,
        ))
    }
}
