//! Webhook management surface (spec §6 "`POST /v1/webhook/{enable|disable|
//! reset|update}` and `GET /v1/webhook/{config,history}`"), JWT-authenticated.
//! This crate has no separate JWT validator trait — [`ApiKeyValidator`]
//! stands in for whatever bearer-credential scheme the auth collaborator
//! uses, the same way it does for the openapi surface (see DESIGN.md).

use axum::extract::{Extension, Query};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::entity_ids::{CanvasId, WebhookId};
use crate::error::{ControlPlaneError, Result};
use crate::ingress::auth;
use crate::server::state::AppState;
use crate::webhook::Webhook;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    api_id: String,
    canvas_id: String,
    is_enabled: bool,
    timeout_seconds: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        Self {
            api_id: webhook.api_id.to_string(),
            canvas_id: webhook.canvas_id.to_string(),
            is_enabled: webhook.is_enabled,
            timeout_seconds: webhook.timeout_secs,
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
        }
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn parse_webhook_id(raw: &str) -> Result<WebhookId> {
    raw.parse()
        .map_err(|_| ControlPlaneError::RequestParams("invalid apiId".to_string()))
}

/// Confirms the caller owns this webhook before any mutation or read; the
/// service layer itself is uid-agnostic once an `apiId` is known.
async fn fetch_owned(state: &AppState, uid: &crate::common::entity_ids::Uid, api_id: &WebhookId) -> Result<Webhook> {
    let webhook = state.webhooks.fetch(api_id).await?;
    if webhook.uid != *uid {
        return Err(ControlPlaneError::NotFound(format!("webhook {api_id} not found")));
    }
    Ok(webhook)
}

#[derive(Debug, Deserialize)]
struct EnableRequest {
    #[serde(rename = "canvasId")]
    canvas_id: String,
    #[serde(rename = "timeoutSeconds", default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

pub async fn webhook_enable_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EnableRequest>,
) -> Result<Json<WebhookResponse>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let canvas_id: CanvasId = payload
        .canvas_id
        .parse()
        .map_err(|_| ControlPlaneError::RequestParams("invalid canvasId".to_string()))?;
    let webhook = state
        .webhooks
        .enable(&uid, &canvas_id, std::time::Duration::from_secs(payload.timeout_seconds))
        .await?;
    Ok(Json(webhook.into()))
}

#[derive(Debug, Deserialize)]
struct ApiIdRequest {
    #[serde(rename = "apiId")]
    api_id: String,
}

pub async fn webhook_disable_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ApiIdRequest>,
) -> Result<Json<WebhookResponse>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let api_id = parse_webhook_id(&payload.api_id)?;
    fetch_owned(&state, &uid, &api_id).await?;
    let webhook = state.webhooks.disable(&api_id).await?;
    Ok(Json(webhook.into()))
}

pub async fn webhook_reset_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ApiIdRequest>,
) -> Result<Json<WebhookResponse>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let api_id = parse_webhook_id(&payload.api_id)?;
    fetch_owned(&state, &uid, &api_id).await?;
    let webhook = state.webhooks.reset(&api_id).await?;
    Ok(Json(webhook.into()))
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(rename = "apiId")]
    api_id: String,
    #[serde(rename = "timeoutSeconds")]
    timeout_seconds: u64,
}

pub async fn webhook_update_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<WebhookResponse>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let api_id = parse_webhook_id(&payload.api_id)?;
    fetch_owned(&state, &uid, &api_id).await?;
    let webhook = state
        .webhooks
        .update(&api_id, std::time::Duration::from_secs(payload.timeout_seconds))
        .await?;
    Ok(Json(webhook.into()))
}

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    #[serde(rename = "apiId")]
    api_id: String,
}

pub async fn webhook_config_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<WebhookResponse>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let api_id = parse_webhook_id(&query.api_id)?;
    let webhook = fetch_owned(&state, &uid, &api_id).await?;
    Ok(Json(webhook.into()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "canvasId")]
    canvas_id: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallHistoryEntry {
    record_id: String,
    api_id: Option<String>,
    canvas_id: Option<String>,
    request_url: String,
    request_method: String,
    http_status: Option<i32>,
    response_time_ms: Option<i64>,
    status: Option<&'static str>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

pub async fn webhook_history_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ApiCallHistoryEntry>>> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let canvas_id = query
        .canvas_id
        .as_deref()
        .map(|s| s.parse::<CanvasId>())
        .transpose()
        .map_err(|_| ControlPlaneError::RequestParams("invalid canvasId".to_string()))?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let records = state.audit.history(&uid, canvas_id.as_ref(), limit).await?;
    let entries = records
        .into_iter()
        .map(|r| ApiCallHistoryEntry {
            record_id: r.record_id.to_string(),
            api_id: r.api_id.map(|id| id.to_string()),
            canvas_id: r.canvas_id.map(|id| id.to_string()),
            request_url: r.request_url,
            request_method: r.request_method,
            http_status: r.http_status,
            response_time_ms: r.response_time_ms,
            status: r.status.map(|s| match s {
                crate::audit::model::ApiCallStatus::Success => "success",
                crate::audit::model::ApiCallStatus::Failed => "failed",
            }),
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            completed_at: r.completed_at,
        })
        .collect();
    Ok(Json(entries))
}
