//! `Webhook` row (spec §3).

use crate::common::entity_ids::{CanvasId, Uid, WebhookId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::time::Duration;

#[derive(Debug, Clone, FromRow)]
pub struct Webhook {
    pub api_id: WebhookId,
    pub uid: Uid,
    pub canvas_id: CanvasId,
    pub is_enabled: bool,
    pub timeout_secs: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(0) as u64)
    }
}
