//! Interfaces for the systems spec §1 explicitly puts out of scope: "only
//! their interfaces appear here." This crate depends on these traits, never
//! on a concrete implementation of the canvas editor, workflow engine, or
//! billing system — production wiring supplies real adapters at the
//! boundary (HTTP clients, gRPC stubs, whatever the collaborator exposes).

use crate::common::entity_ids::{CanvasId, Uid, WorkflowExecutionId};
use crate::queue::ExecuteScheduledWorkflowPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The canvas editor / template store (spec §1).
#[async_trait]
pub trait CanvasLookup: Send + Sync {
    async fn title(&self, canvas_id: &CanvasId) -> anyhow::Result<String>;
    /// The canvas's declared `WorkflowVariable[]` for the variable
    /// normalizer (spec §4.4).
    async fn declared_variables(&self, canvas_id: &CanvasId) -> anyhow::Result<Value>;
    /// The raw nodes/edges payload passed through to
    /// `executeFromCanvasData` (spec §4.8); opaque to this crate.
    async fn canvas_data(&self, canvas_id: &CanvasId) -> anyhow::Result<Value>;
}

/// Outcome of invoking the external workflow engine (spec §4.8).
pub struct WorkflowRunOutcome {
    pub execution_canvas_id: CanvasId,
    pub workflow_execution_id: WorkflowExecutionId,
}

/// The workflow engine that interprets nodes/edges (spec §1: "we invoke it
/// as `executeFromCanvasData`").
#[async_trait]
pub trait WorkflowEngineClient: Send + Sync {
    async fn execute_from_canvas_data(
        &self,
        uid: &Uid,
        canvas_data: &Value,
        variables: &Value,
        context: WorkflowTriggerContext,
    ) -> anyhow::Result<WorkflowRunOutcome>;
}

/// The `{scheduleId, scheduleRecordId, triggerType}` context spec §4.8
/// passes alongside the canvas payload.
#[derive(Debug, Clone)]
pub struct WorkflowTriggerContext {
    pub schedule_id: Option<crate::common::entity_ids::ScheduleId>,
    pub schedule_record_id: Option<crate::common::entity_ids::ScheduleRecordId>,
    pub trigger_type: TriggerType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Cron,
    Webhook,
    Api,
    Manual,
}

/// Consumer of `execute-scheduled-workflow` jobs (spec §4.2 step 7), kept as
/// a trait so the schedule engine's enqueue path and the worker's dequeue
/// path share one payload type without a circular module dependency.
pub type ScheduledWorkflowPayload = ExecuteScheduledWorkflowPayload;

/// A file newly registered against the object-storage backend (spec §1
/// Non-goals: "we specify only the entities we read and write").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredFile {
    pub storage_key: String,
    pub original_name: String,
}

/// The object-storage-backed drive service that turns sandbox output paths
/// into registered, user-visible files (spec §4.7 job processor:
/// "`driveService.batchCreate(context, output.diff.added)`").
#[async_trait]
pub trait DriveService: Send + Sync {
    async fn batch_create(
        &self,
        uid: &Uid,
        canvas_id: &CanvasId,
        added_paths: &[String],
    ) -> anyhow::Result<Vec<RegisteredFile>>;
}
