//! Schedule Priority Service (spec §4.1, component C1): a pure function of
//! a user's plan, recent failure streak, and schedule load. Grounded in the
//! reference monorepo's `kernel/jobs/job.rs` `JobPriority::as_i16()`
//! ordering convention, generalized from that enum's four fixed tiers to
//! this spec's continuous 1-10 scale with failure/load penalties.

use crate::common::entity_ids::{ScheduleRecordId, Uid};
use crate::config::SchedulingConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// The subscription plans spec §4.1 names, mapped to a base priority.
/// Billing/subscription state itself is owned by an external collaborator
/// (spec §1 Non-goals) — this crate only reads the plan tier it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
pub enum Plan {
    Max,
    Plus,
    Starter,
    Maker,
    Test,
    Free,
}

impl Plan {
    fn base_priority(self) -> u8 {
        match self {
            Plan::Max => 1,
            Plan::Plus => 3,
            Plan::Starter => 5,
            Plan::Maker => 7,
            Plan::Test => 8,
            Plan::Free => 10,
        }
    }
}

/// A record of a completed run, just enough to walk the failure streak
/// (spec §4.1 step 3).
#[derive(Debug, Clone)]
pub struct CompletedRunOutcome {
    pub record_id: ScheduleRecordId,
    pub succeeded: bool,
    pub completed_at: DateTime<Utc>,
}

/// The external/internal lookups the priority calculation needs. Kept as a
/// trait so the billing-owned half (active subscription) and the
/// locally-owned half (recent records, active schedule count) can be
/// provided independently, matching spec §1's framing of auth/billing as an
/// external collaborator whose interface only is specified here.
#[async_trait]
pub trait PriorityInputs: Send + Sync {
    async fn active_plan(&self, uid: &Uid) -> anyhow::Result<Option<Plan>>;
    async fn recent_completed_runs(
        &self,
        uid: &Uid,
        limit: i64,
    ) -> anyhow::Result<Vec<CompletedRunOutcome>>;
    async fn active_schedule_count(&self, uid: &Uid) -> anyhow::Result<u32>;
}

/// Computes `priority(uid)` per spec §4.1's five-step algorithm.
pub async fn priority(
    uid: &Uid,
    inputs: &dyn PriorityInputs,
    config: &SchedulingConfig,
) -> anyhow::Result<u8> {
    let plan = inputs.active_plan(uid).await?;
    let base = plan
        .map(Plan::base_priority)
        .unwrap_or(config.default_priority);

    let recent = inputs.recent_completed_runs(uid, 20).await?;
    let consecutive_failures = count_leading_failures(&recent);
    let failure_penalty = consecutive_failures.min(MAX_FAILURE_LEVELS) * FAILURE_PENALTY;

    let active_schedules = inputs.active_schedule_count(uid).await?;
    let load_penalty = if active_schedules > config.high_load_threshold {
        HIGH_LOAD_PENALTY
    } else {
        0
    };

    let raw = base as u32 + failure_penalty as u32 + load_penalty as u32;
    Ok(raw.clamp(1, config.max_priority as u32) as u8)
}

const MAX_FAILURE_LEVELS: u8 = 3;
const FAILURE_PENALTY: u8 = 1;
const HIGH_LOAD_PENALTY: u8 = 2;

/// Counts failures at the head of `recent` (ordered newest-first), stopping
/// at the first success (spec §4.1 step 3: "stopping at the first
/// non-failed").
fn count_leading_failures(recent: &[CompletedRunOutcome]) -> u8 {
    recent
        .iter()
        .take_while(|run| !run.succeeded)
        .count()
        .min(u8::MAX as usize) as u8
}

/// Implements [`PriorityInputs`] against this crate's own `schedule_records`
/// and `schedules` tables, deferring only the active-plan lookup to an
/// injected billing client.
pub struct PgPriorityInputs<B> {
    pool: PgPool,
    billing: B,
}

#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn active_plan(&self, uid: &Uid) -> anyhow::Result<Option<Plan>>;
}

impl<B: BillingClient> PgPriorityInputs<B> {
    pub fn new(pool: PgPool, billing: B) -> Self {
        Self { pool, billing }
    }
}

#[async_trait]
impl<B: BillingClient> PriorityInputs for PgPriorityInputs<B> {
    async fn active_plan(&self, uid: &Uid) -> anyhow::Result<Option<Plan>> {
        self.billing.active_plan(uid).await
    }

    async fn recent_completed_runs(
        &self,
        uid: &Uid,
        limit: i64,
    ) -> anyhow::Result<Vec<CompletedRunOutcome>> {
        let rows: Vec<(uuid::Uuid, bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT sr.id, (sr.status = 'success') AS succeeded, sr.completed_at
            FROM schedule_records sr
            JOIN schedules s ON s.id = sr.schedule_id
            WHERE s.uid = $1 AND sr.status IN ('success', 'failed') AND sr.completed_at IS NOT NULL
            ORDER BY sr.completed_at DESC
            LIMIT $2
            "#,
        )
        .bind(uid.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, succeeded, completed_at)| CompletedRunOutcome {
                record_id: ScheduleRecordId::from_uuid(id),
                succeeded,
                completed_at,
            })
            .collect())
    }

    async fn active_schedule_count(&self, uid: &Uid) -> anyhow::Result<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM schedules WHERE uid = $1 AND is_enabled = true AND deleted_at IS NULL",
        )
        .bind(uid.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(succeeded: bool) -> CompletedRunOutcome {
        CompletedRunOutcome {
            record_id: ScheduleRecordId::new(),
            succeeded,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn plan_base_priority_matches_spec_values() {
        assert_eq!(Plan::Max.base_priority(), 1);
        assert_eq!(Plan::Plus.base_priority(), 3);
        assert_eq!(Plan::Starter.base_priority(), 5);
        assert_eq!(Plan::Maker.base_priority(), 7);
        assert_eq!(Plan::Test.base_priority(), 8);
        assert_eq!(Plan::Free.base_priority(), 10);
    }

    #[test]
    fn count_leading_failures_stops_at_first_success() {
        let recent = vec![outcome(false), outcome(false), outcome(true), outcome(false)];
        assert_eq!(count_leading_failures(&recent), 2);
    }

    #[test]
    fn count_leading_failures_is_zero_when_first_run_succeeded() {
        let recent = vec![outcome(true), outcome(false)];
        assert_eq!(count_leading_failures(&recent), 0);
    }

    #[test]
    fn count_leading_failures_caps_at_max_failure_levels_equivalent() {
        let recent: Vec<_> = std::iter::repeat_with(|| outcome(false)).take(20).collect();
        assert_eq!(count_leading_failures(&recent), 20);
        // the cap to MAX_FAILURE_LEVELS is applied by `priority()`, not here.
    }
}
