//! Auto-pause and kill processors (spec §4.5 "Auto-pause processor", "Kill
//! processor"). Consumed by the worker module's queue-bound tasks, kept here
//! because both operate directly on `SandboxMetadata` and the provider.

use super::metadata::{self, SandboxMetadata};
use super::provider::SandboxProvider;
use crate::redis::lock::{sandbox_lock_key, LockHandle};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Spec §4.5: "loads metadata; skips if already paused; tries to acquire a
/// short non-blocking sandbox lock; if held, skip (the sandbox is in use);
/// otherwise calls betaPause(), sets isPaused=true, lastPausedAt=now, saves
/// metadata."
pub async fn auto_pause(
    redis: &ConnectionManager,
    provider: &dyn SandboxProvider,
    sandbox_id: &str,
) -> anyhow::Result<()> {
    let mut conn = redis.clone();
    let raw: Option<String> = conn.get(metadata::redis_key(sandbox_id)).await?;
    let Some(mut metadata) = raw.and_then(|s| serde_json::from_str::<SandboxMetadata>(&s).ok()) else {
        tracing::debug!(%sandbox_id, "auto-pause: no metadata, sandbox already gone");
        return Ok(());
    };

    if metadata.is_paused {
        return Ok(());
    }

    // Non-blocking: a single `try_acquire` with no poll loop (spec: "tries to
    // acquire a short non-blocking sandbox lock").
    let lock = LockHandle::try_acquire(conn.clone(), sandbox_lock_key(sandbox_id), Duration::from_secs(5)).await?;
    let Some(lock) = lock else {
        tracing::debug!(%sandbox_id, "auto-pause: sandbox is in use, skipping");
        return Ok(());
    };

    provider.beta_pause(sandbox_id).await?;
    metadata.mark_paused(crate::common::time::now());
    let payload = serde_json::to_string(&metadata)?;
    let _: () = conn.set(metadata::redis_key(sandbox_id), payload).await?;

    lock.release().await.ok();
    Ok(())
}

/// Spec §4.5 "Kill processor": retries `connect -> kill` up to
/// `max_attempts` with `interval` delay; success/failure are logged but
/// never retried further (the job itself is not requeued on failure).
pub async fn kill(
    provider: &dyn SandboxProvider,
    sandbox_id: &str,
    max_attempts: u32,
    interval: Duration,
) {
    for attempt in 1..=max_attempts {
        match provider.connect(sandbox_id).await {
            Ok(_) => match provider.kill(sandbox_id).await {
                Ok(()) => {
                    tracing::info!(%sandbox_id, attempt, "sandbox killed");
                    return;
                }
                Err(error) => {
                    tracing::warn!(%sandbox_id, attempt, %error, "kill attempt failed");
                }
            },
            Err(error) => {
                tracing::warn!(%sandbox_id, attempt, %error, "connect-before-kill attempt failed");
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    tracing::error!(%sandbox_id, max_attempts, "kill exhausted all retries, giving up");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_lock_key_matches_pool_convention() {
        assert_eq!(sandbox_lock_key("sbx_1"), "lock:sandbox:sbx_1");
    }
}
