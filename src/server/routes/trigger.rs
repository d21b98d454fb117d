//! The C3 ingress gate (spec §4.3, §6): auth → rate limit → debounce →
//! variable normalize → dispatch, for the two HTTP trigger surfaces.
//!
//! `/v1/openapi/webhook/{webhookId}/run` is public (no auth) and
//! fire-and-forget: it returns `{received: true}` before the workflow
//! finishes (spec §6, §8 Scenario 5). `/v1/openapi/workflow/run` is
//! bearer-authenticated and returns `{executionId, status: "running"}`
//! synchronously, also before the workflow finishes — the response only
//! waits for the `ScheduleRecord` to exist, not for the engine call.

use std::collections::HashMap;

use axum::extract::{Extension, Path};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::entity_ids::{CanvasId, WebhookId};
use crate::error::{ControlPlaneError, Result};
use crate::external::TriggerType;
use crate::ingress::{auth, debounce, rate_limit};
use crate::server::state::AppState;
use crate::variables::WorkflowVariable;

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
        .collect()
}

async fn declared_variables(state: &AppState, canvas_id: &CanvasId) -> Result<Vec<WorkflowVariable>> {
    let raw = state
        .canvas
        .declared_variables(canvas_id)
        .await
        .map_err(ControlPlaneError::Internal)?;
    serde_json::from_value(raw)
        .map_err(|e| ControlPlaneError::Internal(anyhow::anyhow!("invalid declared variables: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookRunBody {
    #[serde(default)]
    variables: HashMap<String, Value>,
}

#[derive(Serialize)]
pub struct WebhookRunResponse {
    received: bool,
}

/// `POST /v1/openapi/webhook/{webhookId}/run` (spec §6): public, rate-limited
/// and debounced per webhook owner, body either empty or `{variables: {...}}`
/// — any other top-level field is a 400.
pub async fn webhook_run_handler(
    Extension(state): Extension<AppState>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(HeaderMap, Json<WebhookRunResponse>)> {
    let webhook_id: WebhookId = webhook_id
        .parse()
        .map_err(|_| ControlPlaneError::RequestParams("invalid webhookId".to_string()))?;

    let runtime_vars: HashMap<String, Value> = if body.is_empty() {
        HashMap::new()
    } else {
        let parsed: WebhookRunBody = serde_json::from_slice(&body)
            .map_err(|e| ControlPlaneError::RequestParams(format!("invalid body: {e}")))?;
        parsed.variables
    };

    let mut conn = state.redis.clone();
    let projection = match crate::ingress::webhook_cache::get(&mut conn, &webhook_id)
        .await
        .unwrap_or(None)
    {
        Some(projection) => projection,
        None => {
            let webhook = state.webhooks.fetch(&webhook_id).await?;
            let _ = state.webhooks.refresh_cache(&webhook).await;
            crate::ingress::webhook_cache::WebhookConfigProjection {
                api_id: webhook.api_id,
                uid: webhook.uid,
                canvas_id: webhook.canvas_id,
                is_enabled: webhook.is_enabled,
                timeout: webhook.timeout(),
            }
        }
    };

    if !projection.is_enabled {
        return Err(ControlPlaneError::NotFound(format!("webhook {webhook_id} not found")));
    }

    let windows = state.config.ingress.webhook_windows();
    let rate_status = rate_limit::check_and_increment(&mut conn, "webhook_rate_limit", &projection.uid, windows).await;
    if !rate_status.allowed {
        return Err(ControlPlaneError::RateLimited {
            limit_rpm: rate_status.limit_rpm,
            remaining_rpm: rate_status.remaining_rpm,
            limit_daily: rate_status.limit_daily,
            remaining_daily: rate_status.remaining_daily,
        });
    }

    let body_value = serde_json::to_value(&runtime_vars).unwrap_or(Value::Null);
    let fp = debounce::fingerprint(&projection.uid, webhook_id.as_str(), &body_value);
    let is_first = debounce::check_and_mark(
        &mut conn,
        "webhook_debounce",
        &fp,
        state.config.ingress.debounce_ttl,
    )
    .await;
    if !is_first {
        return Err(ControlPlaneError::Debounced);
    }

    let request_headers = headers_to_map(&headers);
    let call = state
        .audit
        .start(
            &projection.uid,
            Some(&webhook_id),
            Some(&projection.canvas_id),
            &format!("/v1/openapi/webhook/{webhook_id}/run"),
            "POST",
            &request_headers,
            &body_value,
        )
        .await?;

    let declared = declared_variables(&state, &projection.canvas_id).await?;
    let variables = crate::variables::normalize(
        projection.uid.to_string().as_str(),
        &declared,
        &runtime_vars,
        state.files.as_ref(),
    )
    .await;
    let variables_value = serde_json::to_value(&variables).unwrap_or(Value::Null);

    let canvas_data = state
        .canvas
        .canvas_data(&projection.canvas_id)
        .await
        .map_err(ControlPlaneError::Internal)?;
    let title = state
        .canvas
        .title(&projection.canvas_id)
        .await
        .unwrap_or_else(|_| "untitled workflow".to_string());

    let record_id = state
        .projector
        .start_running_trigger(
            &projection.uid,
            &projection.canvas_id,
            &title,
            state.config.scheduling.default_priority as i16,
        )
        .await?;

    let projector = state.projector.clone();
    let uid = projection.uid;
    tokio::spawn(async move {
        if let Err(error) = projector
            .finish_trigger(&uid, &canvas_data, &variables_value, TriggerType::Webhook, record_id)
            .await
        {
            tracing::error!(%error, %record_id, "webhook-triggered workflow run failed to project");
        }
    });

    state.audit.complete(&call, 200, None, None).await?;

    Ok((rate_limit::headers(&rate_status), Json(WebhookRunResponse { received: true })))
}

#[derive(Debug, Deserialize)]
struct OpenApiWorkflowRunBody {
    #[serde(rename = "canvasId")]
    canvas_id: String,
    #[serde(default)]
    variables: HashMap<String, Value>,
}

#[derive(Serialize)]
pub struct OpenApiWorkflowRunResponse {
    #[serde(rename = "executionId")]
    execution_id: String,
    status: &'static str,
}

/// `POST /v1/openapi/workflow/run` (spec §6): bearer-authenticated,
/// rate-limited and debounced per `(uid, canvasId)`, returns
/// `{executionId, status: "running"}` before the workflow finishes.
pub async fn openapi_workflow_run_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OpenApiWorkflowRunBody>,
) -> Result<(HeaderMap, Json<OpenApiWorkflowRunResponse>)> {
    let uid = auth::authenticate(&headers, state.api_key_validator.as_ref()).await?;
    let canvas_id: CanvasId = payload
        .canvas_id
        .parse()
        .map_err(|_| ControlPlaneError::RequestParams("invalid canvasId".to_string()))?;

    let mut conn = state.redis.clone();
    let windows = state.config.ingress.openapi_windows();
    let rate_status = rate_limit::check_and_increment(&mut conn, "openapi:rate_limit", &uid, windows).await;
    if !rate_status.allowed {
        return Err(ControlPlaneError::RateLimited {
            limit_rpm: rate_status.limit_rpm,
            remaining_rpm: rate_status.remaining_rpm,
            limit_daily: rate_status.limit_daily,
            remaining_daily: rate_status.remaining_daily,
        });
    }

    let body_value = serde_json::json!({ "canvasId": payload.canvas_id, "variables": payload.variables });
    let fp = debounce::fingerprint(&uid, &payload.canvas_id, &body_value);
    let is_first = debounce::check_and_mark(&mut conn, "openapi:debounce", &fp, state.config.ingress.debounce_ttl).await;
    if !is_first {
        return Err(ControlPlaneError::Debounced);
    }

    let request_headers = headers_to_map(&headers);
    let call = state
        .audit
        .start(
            &uid,
            None,
            Some(&canvas_id),
            "/v1/openapi/workflow/run",
            "POST",
            &request_headers,
            &body_value,
        )
        .await?;

    let declared = declared_variables(&state, &canvas_id).await?;
    let variables = crate::variables::normalize(uid.to_string().as_str(), &declared, &payload.variables, state.files.as_ref()).await;
    let variables_value = serde_json::to_value(&variables).unwrap_or(Value::Null);

    let canvas_data = state.canvas.canvas_data(&canvas_id).await.map_err(ControlPlaneError::Internal)?;
    let title = state
        .canvas
        .title(&canvas_id)
        .await
        .unwrap_or_else(|_| "untitled workflow".to_string());

    let record_id = state
        .projector
        .start_running_trigger(&uid, &canvas_id, &title, state.config.scheduling.default_priority as i16)
        .await?;

    let projector = state.projector.clone();
    tokio::spawn(async move {
        if let Err(error) = projector
            .finish_trigger(&uid, &canvas_data, &variables_value, TriggerType::Api, record_id)
            .await
        {
            tracing::error!(%error, %record_id, "api-triggered workflow run failed to project");
        }
    });

    state.audit.complete(&call, 200, None, None).await?;

    Ok((
        rate_limit::headers(&rate_status),
        Json(OpenApiWorkflowRunResponse {
            execution_id: record_id.to_string(),
            status: "running",
        }),
    ))
}
