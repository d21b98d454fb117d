//! Execute lock discipline (spec §4.6, component C6): two nested locks —
//! outer `lock:execute:{uid}:{canvasId}` serializes concurrent executions of
//! the same canvas; inner `lock:sandbox:{sandboxId}` serializes any
//! operation on a given sandbox. Both share the acquire/renew/release
//! protocol in `crate::redis::lock`; this module only supplies the key
//! conventions and the renewal wiring spec §4.6 describes.

use crate::config::SandboxConfig;
use crate::error::{ControlPlaneError, Result};
use crate::redis::lock::{execute_lock_key, sandbox_lock_key, LockHandle, RenewalHandle};
use redis::aio::ConnectionManager;

/// A held outer or inner execute-path lock with its renewal timer attached.
/// Dropping this without calling [`release`](Self::release) lets the lock
/// expire on its own TTL.
pub struct ExecuteLockGuard {
    handle: LockHandle,
    renewal: RenewalHandle,
}

impl ExecuteLockGuard {
    /// Acquires `lock:execute:{uid}:{canvasId}` (spec §4.6 "Outer").
    pub async fn acquire_outer(conn: ConnectionManager, uid: &str, canvas_id: &str, config: &SandboxConfig) -> Result<Self> {
        Self::acquire(conn, execute_lock_key(uid, canvas_id), config).await
    }

    /// Acquires `lock:sandbox:{sandboxId}` (spec §4.6 "Inner").
    pub async fn acquire_inner(conn: ConnectionManager, sandbox_id: &str, config: &SandboxConfig) -> Result<Self> {
        Self::acquire(conn, sandbox_lock_key(sandbox_id), config).await
    }

    async fn acquire(conn: ConnectionManager, key: String, config: &SandboxConfig) -> Result<Self> {
        let handle = LockHandle::acquire_with_wait(
            conn,
            key,
            config.lock_initial_ttl,
            config.lock_poll_interval,
            config.lock_wait_timeout,
        )
        .await
        .map_err(|_| ControlPlaneError::SandboxLockTimeout)?;

        let renewal = handle.spawn_renewal(config.lock_initial_ttl, config.lock_renewal_interval);
        Ok(Self { handle, renewal })
    }

    /// `true` once the renewal timer has observed lost ownership (spec §9:
    /// "the caller must not assume continued ownership past its next
    /// observable step").
    pub fn is_lost(&self) -> bool {
        self.renewal.is_lost()
    }

    /// Stops the renewal timer and runs the value-matched Lua delete (spec
    /// §4.6 "Release: Lua script deletes the key only if the value
    /// matches") so a second execution request for the same key doesn't
    /// have to wait out the full TTL behind a lock its previous holder
    /// already finished with.
    pub async fn release(self) {
        self.renewal.cancel();
        let key = self.handle.key().to_string();
        if let Err(error) = self.handle.release().await {
            tracing::warn!(lock_key = %key, %error, "failed to release execute lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_builders_are_reexported_from_redis_lock() {
        assert_eq!(execute_lock_key("u1", "c1"), "lock:execute:u1:c1");
        assert_eq!(sandbox_lock_key("sbx_1"), "lock:sandbox:sbx_1");
    }
}
