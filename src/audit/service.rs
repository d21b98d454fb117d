//! Records and completes `ApiCallRecord` rows, redacting headers/bodies
//! before they ever reach storage (spec §7 "Sensitive data in headers/bodies
//! is redacted").

use super::model::{ApiCallRecord, ApiCallStatus};
use crate::common::entity_ids::{ApiCallRecordId, CanvasId, Uid, WebhookId, WorkflowExecutionId};
use crate::common::redact::{redact_headers, redact_json_body};
use crate::error::{ControlPlaneError, Result};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;

pub struct ApiCallTracker {
    pool: PgPool,
}

/// An in-flight call's identity plus the wall-clock start used to compute
/// `responseTime` on [`ApiCallTracker::complete`].
pub struct InFlightCall {
    pub record_id: ApiCallRecordId,
    started: Instant,
}

impl ApiCallTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the record at the start of the inbound HTTP call, before the
    /// handler does any work (spec: "audit trail for every trigger HTTP
    /// call").
    pub async fn start(
        &self,
        uid: &Uid,
        api_id: Option<&WebhookId>,
        canvas_id: Option<&CanvasId>,
        request_url: &str,
        request_method: &str,
        request_headers: &HashMap<String, String>,
        request_body: &Value,
    ) -> Result<InFlightCall> {
        let record_id = ApiCallRecordId::generate();
        let redacted_headers = serde_json::to_value(redact_headers(request_headers)).unwrap_or(Value::Null);
        let redacted_body = redact_json_body(request_body);

        sqlx::query(
            "INSERT INTO api_call_records \
                (record_id, uid, api_id, canvas_id, request_url, request_method, request_headers, request_body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record_id.as_str())
        .bind(uid.as_uuid())
        .bind(api_id.map(|id| id.as_str().to_string()))
        .bind(canvas_id.map(|id| *id.as_uuid()))
        .bind(request_url)
        .bind(request_method)
        .bind(&redacted_headers)
        .bind(&redacted_body)
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;

        Ok(InFlightCall {
            record_id,
            started: Instant::now(),
        })
    }

    /// Sets the terminal fields exactly once (spec: "rows are immutable
    /// after creation" — this is the one permitted write past insertion).
    pub async fn complete(
        &self,
        call: &InFlightCall,
        http_status: u16,
        workflow_execution_id: Option<&WorkflowExecutionId>,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let status = if (200..400).contains(&http_status) {
            ApiCallStatus::Success
        } else {
            ApiCallStatus::Failed
        };
        let response_time_ms = call.started.elapsed().as_millis() as i64;

        sqlx::query(
            "UPDATE api_call_records \
             SET http_status = $2, response_time_ms = $3, status = $4, failure_reason = $5, \
                 workflow_execution_id = $6, completed_at = now() \
             WHERE record_id = $1",
        )
        .bind(call.record_id.as_str())
        .bind(http_status as i32)
        .bind(response_time_ms)
        .bind(status)
        .bind(failure_reason)
        .bind(workflow_execution_id.map(|id| *id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(ControlPlaneError::Database)?;
        Ok(())
    }

    pub async fn history(&self, uid: &Uid, canvas_id: Option<&CanvasId>, limit: i64) -> Result<Vec<ApiCallRecord>> {
        let records = match canvas_id {
            Some(canvas_id) => {
                sqlx::query_as::<_, ApiCallRecord>(
                    "SELECT * FROM api_call_records WHERE uid = $1 AND canvas_id = $2 ORDER BY created_at DESC LIMIT $3",
                )
                .bind(uid.as_uuid())
                .bind(canvas_id.as_uuid())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ApiCallRecord>(
                    "SELECT * FROM api_call_records WHERE uid = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(uid.as_uuid())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(ControlPlaneError::Database)?;
        Ok(records)
    }
}
