//! Queue data model (spec §2 L2, §6 "Queues"). Grounded in the reference
//! monorepo's `kernel/jobs/job.rs`: the same `FOR UPDATE SKIP LOCKED`
//! claim-style queue, generalized from that repo's generic command queue to
//! the four named queues spec §6 enumerates, with BullMQ-style integer
//! priority (spec Glossary: "1–10, lower = higher").

use crate::common::entity_ids::{CanvasId, ScheduleId, ScheduleRecordId, Uid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The four logical queues spec §6 names. Kept as one table partitioned by
/// this column rather than four tables — matches the teacher's single
/// `jobs` table carrying a `command_type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "camelCase")]
pub enum QueueName {
    ScheduleExecution,
    ScaleboxExecute,
    ScaleboxPause,
    ScaleboxKill,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleExecution => "scheduleExecution",
            Self::ScaleboxExecute => "scaleboxExecute",
            Self::ScaleboxPause => "scaleboxPause",
            Self::ScaleboxKill => "scaleboxKill",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
    Removed,
}

/// BullMQ-style priority: 1-10, lower is higher (spec Glossary, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(i16);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(10);

    pub fn new(value: i16) -> Self {
        Self(value.clamp(1, 10))
    }

    pub fn value(&self) -> i16 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(10)
    }
}

/// Payload shape for the `scheduleExecution` queue (spec §4.2 step 7:
/// `{scheduleId, canvasId, uid, scheduledAt, priority, scheduleRecordId}`).
/// `rename_all = "camelCase"` keeps the wire keys matching that shape so
/// `quota::remove_pending_jobs_for_schedule`'s `"scheduleId"` lookup and any
/// external consumer of this payload see the spec's exact field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteScheduledWorkflowPayload {
    pub schedule_id: ScheduleId,
    pub canvas_id: CanvasId,
    pub uid: Uid,
    pub scheduled_at: DateTime<Utc>,
    pub priority: i16,
    pub schedule_record_id: ScheduleRecordId,
}

/// A row in the job table, generic over the queue it lives in. Mirrors the
/// teacher's `Job` struct fields relevant to this spec's queues (priority,
/// lease/attempts, payload, timestamps) with the reference/workflow/command
/// fields specific to that repo's broader job system dropped.
#[derive(Debug, Clone, FromRow)]
pub struct QueuedJob {
    pub id: uuid::Uuid,
    pub queue: QueueName,
    pub job_id: Option<String>,
    pub payload: serde_json::Value,
    pub priority: i16,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_clamps_to_spec_range() {
        assert_eq!(Priority::new(0).value(), 1);
        assert_eq!(Priority::new(11).value(), 10);
        assert_eq!(Priority::new(5).value(), 5);
    }

    #[test]
    fn lower_priority_value_sorts_first() {
        assert!(Priority::HIGHEST < Priority::LOWEST);
    }
}
