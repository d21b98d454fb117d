//! Webhook config cache (spec §4.3 "Webhook config cache", §9 "Global
//! state"): a 5-minute TTL projection invalidated on every enable/update/
//! reset/disable, modeled as an injected cache service rather than a static
//! singleton per spec §9's guidance.

use crate::common::entity_ids::{CanvasId, Uid, WebhookId};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfigProjection {
    pub api_id: WebhookId,
    pub uid: Uid,
    pub canvas_id: CanvasId,
    pub is_enabled: bool,
    pub timeout: Duration,
}

fn cache_key(api_id: &WebhookId) -> String {
    format!("webhook_config:{api_id}")
}

/// Reads the cached projection, if present and unexpired.
pub async fn get(
    conn: &mut ConnectionManager,
    api_id: &WebhookId,
) -> anyhow::Result<Option<WebhookConfigProjection>> {
    let raw: Option<String> = redis::cmd("GET").arg(cache_key(api_id)).query_async(conn).await?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

/// Writes the projection with a 5-minute TTL (spec §6 "webhook config cache
/// TTL 300 s").
pub async fn put(
    conn: &mut ConnectionManager,
    projection: &WebhookConfigProjection,
    ttl: Duration,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(projection)?;
    redis::cmd("SET")
        .arg(cache_key(&projection.api_id))
        .arg(payload)
        .arg("EX")
        .arg(ttl.as_secs().max(1))
        .query_async::<()>(conn)
        .await?;
    Ok(())
}

/// Invalidates on any enable/update/reset/disable (spec §4.3).
pub async fn invalidate(conn: &mut ConnectionManager, api_id: &WebhookId) -> anyhow::Result<()> {
    redis::cmd("DEL").arg(cache_key(api_id)).query_async::<()>(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_matches_spec_convention() {
        let id = WebhookId::generate();
        assert_eq!(cache_key(&id), format!("webhook_config:{id}"));
    }
}
