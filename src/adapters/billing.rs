//! Billing/subscription adapter (spec §4.1: "Billing/subscription state
//! itself is owned by an external collaborator").

use crate::common::entity_ids::Uid;
use crate::priority::{BillingClient, Plan};
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct HttpBillingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBillingClient {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BILLING_SERVICE_BASE_URL").context("BILLING_SERVICE_BASE_URL must be set")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("failed to build billing service HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[derive(serde::Deserialize)]
struct PlanResponse {
    plan: Option<String>,
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    async fn active_plan(&self, uid: &Uid) -> Result<Option<Plan>> {
        let response = self
            .client
            .get(format!("{}/billing/{uid}/plan", self.base_url))
            .send()
            .await
            .context("billing service request failed")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("billing service error {status}: {body}");
        }
        let body: PlanResponse = response.json().await.context("invalid billing service response")?;
        Ok(body.plan.and_then(|plan| match plan.as_str() {
            "Max" => Some(Plan::Max),
            "Plus" => Some(Plan::Plus),
            "Starter" => Some(Plan::Starter),
            "Maker" => Some(Plan::Maker),
            "Test" => Some(Plan::Test),
            "Free" => Some(Plan::Free),
            _ => None,
        }))
    }
}
