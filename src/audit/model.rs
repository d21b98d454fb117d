//! `ApiCallRecord` (spec §3): audit trail for every trigger HTTP call,
//! immutable after creation — this crate only ever inserts and later sets
//! the terminal fields exactly once via [`super::service::ApiCallTracker::complete`].

use crate::common::entity_ids::{ApiCallRecordId, CanvasId, Uid, WebhookId, WorkflowExecutionId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ApiCallStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiCallRecord {
    pub record_id: ApiCallRecordId,
    pub uid: Uid,
    pub api_id: Option<WebhookId>,
    pub canvas_id: Option<CanvasId>,
    pub workflow_execution_id: Option<WorkflowExecutionId>,
    pub request_url: String,
    pub request_method: String,
    pub request_headers: Value,
    pub request_body: Value,
    pub http_status: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub status: Option<ApiCallStatus>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
