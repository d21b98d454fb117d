//! Webhook management (spec §6 "`POST /v1/webhook/{enable|disable|reset|
//! update}` and `GET /v1/webhook/{config,history}`"). Every mutation
//! invalidates the ingress gate's webhook config cache (spec §4.3, §9
//! "Global state").

use super::model::Webhook;
use crate::common::entity_ids::{CanvasId, Uid, WebhookId};
use crate::error::{ControlPlaneError, Result};
use crate::ingress::webhook_cache::{self, WebhookConfigProjection};
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::time::Duration;

pub struct WebhookService {
    pool: PgPool,
    redis: ConnectionManager,
    config_cache_ttl: Duration,
}

impl WebhookService {
    pub fn new(pool: PgPool, redis: ConnectionManager, config_cache_ttl: Duration) -> Self {
        Self {
            pool,
            redis,
            config_cache_ttl,
        }
    }

    /// Enable: create-or-revive semantics. Spec §9: "an `enable` for an
    /// existing soft-deleted row must revive it rather than create a new
    /// id." A live (non-deleted) row for `(uid, canvasId)` is just flipped
    /// on; a soft-deleted one is revived in place, keeping its `apiId`.
    pub async fn enable(&self, uid: &Uid, canvas_id: &CanvasId, timeout: Duration) -> Result<Webhook> {
        if let Some(existing) = self.find_any(uid, canvas_id).await? {
            let webhook = sqlx::query_as::<_, Webhook>(
                "UPDATE webhooks SET is_enabled = true, timeout_secs = $2, deleted_at = NULL, updated_at = now() \
                 WHERE api_id = $1 RETURNING *",
            )
            .bind(existing.api_id.as_str())
            .bind(timeout.as_secs() as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(ControlPlaneError::Database)?;
            self.invalidate(&webhook.api_id).await;
            return Ok(webhook);
        }

        let api_id = WebhookId::generate();
        let webhook = sqlx::query_as::<_, Webhook>(
            "INSERT INTO webhooks (api_id, uid, canvas_id, is_enabled, timeout_secs) \
             VALUES ($1, $2, $3, true, $4) RETURNING *",
        )
        .bind(api_id.as_str())
        .bind(uid.as_uuid())
        .bind(canvas_id.as_uuid())
        .bind(timeout.as_secs() as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        self.invalidate(&webhook.api_id).await;
        Ok(webhook)
    }

    pub async fn disable(&self, api_id: &WebhookId) -> Result<Webhook> {
        let webhook = sqlx::query_as::<_, Webhook>(
            "UPDATE webhooks SET is_enabled = false, updated_at = now() WHERE api_id = $1 RETURNING *",
        )
        .bind(api_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?
        .ok_or_else(|| ControlPlaneError::NotFound(format!("webhook {api_id} not found")))?;
        self.invalidate(api_id).await;
        Ok(webhook)
    }

    /// Reset: spec §3 invariant "resetting generates a new `apiId`." Rewrites
    /// `api_id` on the same row rather than soft-deleting and inserting a
    /// new one — the `(canvasId, uid)` uniqueness invariant covers
    /// soft-deleted rows too (spec §3, §9), so a delete-then-insert would
    /// leave two rows matching `(uid, canvasId)` and confuse `find_any`.
    pub async fn reset(&self, api_id: &WebhookId) -> Result<Webhook> {
        let fresh_id = WebhookId::generate();
        let webhook = sqlx::query_as::<_, Webhook>(
            "UPDATE webhooks SET api_id = $2, is_enabled = true, deleted_at = NULL, updated_at = now() \
             WHERE api_id = $1 RETURNING *",
        )
        .bind(api_id.as_str())
        .bind(fresh_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?
        .ok_or_else(|| ControlPlaneError::NotFound(format!("webhook {api_id} not found")))?;
        self.invalidate(api_id).await;
        self.invalidate(&webhook.api_id).await;
        Ok(webhook)
    }

    pub async fn update(&self, api_id: &WebhookId, timeout: Duration) -> Result<Webhook> {
        let webhook = sqlx::query_as::<_, Webhook>(
            "UPDATE webhooks SET timeout_secs = $2, updated_at = now() WHERE api_id = $1 RETURNING *",
        )
        .bind(api_id.as_str())
        .bind(timeout.as_secs() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?
        .ok_or_else(|| ControlPlaneError::NotFound(format!("webhook {api_id} not found")))?;
        self.invalidate(api_id).await;
        Ok(webhook)
    }

    pub async fn fetch(&self, api_id: &WebhookId) -> Result<Webhook> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE api_id = $1")
            .bind(api_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(ControlPlaneError::Database)?
            .ok_or_else(|| ControlPlaneError::NotFound(format!("webhook {api_id} not found")))
    }

    /// Finds the row for `(uid, canvasId)` regardless of soft-delete state.
    /// Since `api_id` is unique across `(uid, canvasId)` unconditionally
    /// (spec §3), there is at most one row to find.
    async fn find_any(&self, uid: &Uid, canvas_id: &CanvasId) -> Result<Option<Webhook>> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE uid = $1 AND canvas_id = $2")
            .bind(uid.as_uuid())
            .bind(canvas_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(ControlPlaneError::Database)
    }

    async fn invalidate(&self, api_id: &WebhookId) {
        let mut conn = self.redis.clone();
        if let Err(error) = webhook_cache::invalidate(&mut conn, api_id).await {
            tracing::warn!(%api_id, %error, "failed to invalidate webhook config cache");
        }
    }

    /// Populates the cache after a fresh DB read, used by the ingress gate's
    /// cache-miss path (spec §4.3).
    pub async fn refresh_cache(&self, webhook: &Webhook) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        webhook_cache::put(
            &mut conn,
            &WebhookConfigProjection {
                api_id: webhook.api_id.clone(),
                uid: webhook.uid,
                canvas_id: webhook.canvas_id,
                is_enabled: webhook.is_enabled,
                timeout: webhook.timeout(),
            },
            self.config_cache_ttl,
        )
        .await
    }
}
