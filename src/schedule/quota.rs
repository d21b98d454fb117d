//! Plan-quota enforcement (spec §4.2 step 4, scenario 3, §9 open question on
//! disabling order). Disables the newest excess schedules first and
//! best-effort removes their pending/delayed queue jobs.

use crate::common::entity_ids::{ScheduleId, Uid};
use crate::priority::Plan;
use crate::queue::{JobQueue, JobState, QueueName};
use anyhow::Result;
use sqlx::PgPool;

/// Spec §9: "disabling newest-first (by `createdAt desc`) is the observed
/// behavior... Preserve the observed order unless product decides
/// otherwise." See DESIGN.md Open Question decisions.
pub async fn enforce_quota(
    pool: &PgPool,
    queue: &dyn JobQueue,
    uid: &Uid,
    plan: Option<Plan>,
    free_max_active_schedules: u32,
    paid_max_active_schedules: u32,
    exempt_schedule_id: &ScheduleId,
) -> Result<Vec<ScheduleId>> {
    let quota = if plan.is_some() {
        paid_max_active_schedules
    } else {
        free_max_active_schedules
    };

    let active_ids: Vec<(uuid::Uuid,)> = sqlx::query_as(
        "SELECT id FROM schedules \
         WHERE uid = $1 AND is_enabled = true AND deleted_at IS NULL \
         ORDER BY created_at DESC",
    )
    .bind(uid.as_uuid())
    .fetch_all(pool)
    .await?;

    let active_ids: Vec<ScheduleId> = active_ids
        .into_iter()
        .map(|(id,)| ScheduleId::from_uuid(id))
        .collect();

    if (active_ids.len() as u32) <= quota {
        return Ok(vec![]);
    }

    // Newest-first, excluding the schedule currently being triggered, until
    // the count is back within quota (spec §4.2 step 4: "The current
    // schedule is excluded from disabling").
    let candidates: Vec<ScheduleId> = active_ids
        .into_iter()
        .filter(|id| id != exempt_schedule_id)
        .collect();
    let excess = candidates.len().saturating_sub((quota as usize).saturating_sub(1).max(0));
    let to_disable: Vec<ScheduleId> = candidates.into_iter().take(excess).collect();

    for schedule_id in &to_disable {
        sqlx::query(
            "UPDATE schedules SET is_enabled = false, next_run_at = NULL WHERE id = $1",
        )
        .bind(schedule_id.as_uuid())
        .execute(pool)
        .await?;

        if let Err(error) = remove_pending_jobs_for_schedule(queue, schedule_id).await {
            tracing::warn!(%schedule_id, %error, "failed to remove queued jobs for disabled schedule");
        }
    }

    Ok(to_disable)
}

/// Best-effort removal via `queue.getJobs(['waiting','delayed'])` filter +
/// `job.remove` (spec §4.9).
async fn remove_pending_jobs_for_schedule(
    queue: &dyn JobQueue,
    schedule_id: &ScheduleId,
) -> Result<()> {
    let jobs = queue
        .get_jobs(QueueName::ScheduleExecution, &[JobState::Waiting, JobState::Delayed])
        .await?;
    for job in jobs {
        let matches = job
            .payload
            .get("scheduleId")
            .and_then(|v| v.as_str())
            .map(|s| s == schedule_id.to_string())
            .unwrap_or(false);
        if matches {
            queue.remove(job.id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn quota_math_leaves_room_for_the_exempt_schedule() {
        // 3 active schedules, quota 1: exempt schedule survives, the other
        // 2 (both non-exempt) get disabled (spec scenario 3).
        let candidates_len = 2usize;
        let quota = 1usize;
        let excess = candidates_len.saturating_sub(quota.saturating_sub(1));
        assert_eq!(excess, 2);
    }
}
