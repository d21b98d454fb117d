//! `Schedule` and `ScheduleRecord` (spec §3), grounded in the reference
//! monorepo's `kernel/jobs/job.rs` field/status conventions (status enum as
//! `sqlx::Type` snake_case) adapted to this spec's exact field set instead of
//! that repo's generic job row.

use crate::common::entity_ids::{CanvasId, ScheduleId, ScheduleRecordId, Uid, WorkflowExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Reserved key merged into `scheduleConfig` when a schedule is auto-disabled
/// (spec §4.2 step 2, §9).
pub const DISABLED_REASON_KEY: &str = "_disabledReason";

#[derive(Debug, Clone, FromRow)]
pub struct Schedule {
    pub id: ScheduleId,
    pub uid: Uid,
    pub canvas_id: CanvasId,
    pub name: String,
    pub cron_expression: String,
    pub timezone: String,
    pub is_enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub schedule_config: serde_json::Value,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Default timezone per spec §3 ("default `Asia/Shanghai`").
    pub const DEFAULT_TIMEZONE: &'static str = "Asia/Shanghai";

    /// Spec §4.2 step 1 fresh-read gate: "Skip if isEnabled=false,
    /// deletedAt!=null, nextRunAt=null, or nextRunAt > now + ε".
    pub fn is_due(&self, now: DateTime<Utc>, epsilon: chrono::Duration) -> bool {
        if !self.is_enabled || self.deleted_at.is_some() {
            return false;
        }
        match self.next_run_at {
            Some(next) => next <= now + epsilon,
            None => false,
        }
    }

    /// Merges `_disabledReason` into `scheduleConfig` without disturbing
    /// other keys (spec §4.2 step 2).
    pub fn with_disabled_reason(mut self, reason: &str) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.schedule_config {
            map.insert(
                DISABLED_REASON_KEY.to_string(),
                serde_json::Value::String(reason.to_string()),
            );
        } else {
            self.schedule_config = serde_json::json!({ DISABLED_REASON_KEY: reason });
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ScheduleRecordStatus {
    Scheduled,
    Pending,
    Processing,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ScheduleRecordStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRecord {
    pub id: ScheduleRecordId,
    /// `None` for webhook/API/manual triggers, which have no parent
    /// `Schedule` row (spec §4.8).
    pub schedule_id: Option<ScheduleId>,
    pub uid: Uid,
    pub source_canvas_id: CanvasId,
    pub canvas_id: Option<CanvasId>,
    pub workflow_title: String,
    pub status: ScheduleRecordStatus,
    pub priority: i16,
    pub scheduled_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow_execution_id: Option<WorkflowExecutionId>,
    pub used_tools: serde_json::Value,
    pub snapshot_storage_key: Option<String>,
    pub failure_reason: Option<String>,
    pub error_details: Option<serde_json::Value>,
}

impl ScheduleRecord {
    /// Only `failed` records with a non-null snapshot key can be retried
    /// (spec §3 invariant).
    pub fn is_retryable(&self) -> bool {
        self.status == ScheduleRecordStatus::Failed && self.snapshot_storage_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_schedule() -> Schedule {
        Schedule {
            id: ScheduleId::new(),
            uid: Uid::new(),
            canvas_id: CanvasId::new(),
            name: "daily digest".into(),
            cron_expression: "0 0 9 * * *".into(),
            timezone: Schedule::DEFAULT_TIMEZONE.into(),
            is_enabled: true,
            next_run_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            last_run_at: None,
            schedule_config: serde_json::json!({}),
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn is_due_when_enabled_and_past_next_run() {
        let schedule = base_schedule();
        assert!(schedule.is_due(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn is_due_false_when_disabled() {
        let mut schedule = base_schedule();
        schedule.is_enabled = false;
        assert!(!schedule.is_due(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn is_due_false_when_deleted() {
        let mut schedule = base_schedule();
        schedule.deleted_at = Some(Utc::now());
        assert!(!schedule.is_due(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn is_due_false_when_next_run_in_future() {
        let mut schedule = base_schedule();
        schedule.next_run_at = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!schedule.is_due(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn is_due_false_when_next_run_is_null() {
        let mut schedule = base_schedule();
        schedule.next_run_at = None;
        assert!(!schedule.is_due(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn with_disabled_reason_merges_into_existing_config() {
        let mut schedule = base_schedule();
        schedule.schedule_config = serde_json::json!({ "key": "value" });
        let schedule = schedule.with_disabled_reason("invalid_cron_expression");
        assert_eq!(schedule.schedule_config["key"], "value");
        assert_eq!(
            schedule.schedule_config[DISABLED_REASON_KEY],
            "invalid_cron_expression"
        );
    }

    #[test]
    fn retryable_requires_failed_and_snapshot() {
        let record = ScheduleRecord {
            id: ScheduleRecordId::new(),
            schedule_id: Some(ScheduleId::new()),
            uid: Uid::new(),
            source_canvas_id: CanvasId::new(),
            canvas_id: None,
            workflow_title: "t".into(),
            status: ScheduleRecordStatus::Failed,
            priority: 5,
            scheduled_at: Utc::now(),
            triggered_at: None,
            completed_at: None,
            workflow_execution_id: None,
            used_tools: serde_json::json!([]),
            snapshot_storage_key: None,
            failure_reason: None,
            error_details: None,
        };
        assert!(!record.is_retryable());
        let retryable = ScheduleRecord {
            snapshot_storage_key: Some("snapshots/abc".into()),
            ..record
        };
        assert!(retryable.is_retryable());
    }
}
