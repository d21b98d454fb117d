//! API key / auth adapter (spec §1 Non-goals: "API key validation... is an
//! external collaborator"). Doubles as the bearer-credential resolver for
//! the JWT-authenticated webhook management surface (spec §6) — this crate
//! has no separate JWT validator trait, see DESIGN.md.

use crate::common::entity_ids::Uid;
use crate::ingress::ApiKeyValidator;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct HttpApiKeyValidator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApiKeyValidator {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("AUTH_SERVICE_BASE_URL").context("AUTH_SERVICE_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("failed to build auth service HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[derive(serde::Deserialize)]
struct ResolveResponse {
    uid: Option<String>,
}

#[async_trait]
impl ApiKeyValidator for HttpApiKeyValidator {
    async fn resolve(&self, api_key: &str) -> Result<Option<Uid>> {
        let response = self
            .client
            .get(format!("{}/auth/resolve", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await
            .context("auth service request failed")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("auth service error {status}: {body}");
        }

        let body: ResolveResponse = response.json().await.context("invalid auth service response")?;
        match body.uid {
            Some(uid) => Ok(Some(uid.parse().context("invalid uid returned by auth service")?)),
            None => Ok(None),
        }
    }
}
