//! `SandboxMetadata` (spec §3), persisted in Redis as `scalebox:metadata:{sandboxId}`
//! (spec §6) rather than Postgres — it's pool-local, high-churn, TTL-free
//! state that the pool and the auto-pause processor are the sole writers of
//! (spec §3 "Ownership/lifecycle summary", §5 "Shared-resource policy").
//! Grounded in the reference monorepo's `kernel/jobs/job.rs` convention of a
//! plain struct with `sqlx::FromRow`-style field naming, adapted here to a
//! Redis-serialized JSON blob since this row has no relational shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub sandbox_id: String,
    pub cwd: String,
    pub created_at: DateTime<Utc>,
    pub idle_since: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub last_paused_at: Option<DateTime<Utc>>,
}

impl SandboxMetadata {
    pub fn new_running(sandbox_id: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            cwd: cwd.into(),
            created_at: Utc::now(),
            idle_since: None,
            is_paused: false,
            last_paused_at: None,
        }
    }

    pub fn mark_idle(&mut self, now: DateTime<Utc>) {
        self.idle_since = Some(now);
    }

    pub fn mark_running(&mut self) {
        self.idle_since = None;
        self.is_paused = false;
    }

    pub fn mark_paused(&mut self, now: DateTime<Utc>) {
        self.is_paused = true;
        self.last_paused_at = Some(now);
    }
}

pub fn redis_key(sandbox_id: &str) -> String {
    format!("scalebox:metadata:{sandbox_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_key_matches_spec_convention() {
        assert_eq!(redis_key("sbx_1"), "scalebox:metadata:sbx_1");
    }

    #[test]
    fn mark_running_clears_idle_and_paused() {
        let mut meta = SandboxMetadata::new_running("sbx_1", "/tmp");
        meta.mark_idle(Utc::now());
        meta.mark_paused(Utc::now());
        meta.mark_running();
        assert!(meta.idle_since.is_none());
        assert!(!meta.is_paused);
    }
}
