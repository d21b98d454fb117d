//! Distributed lock discipline (spec §4.6): `SET key value EX ttl NX`
//! acquisition with polling, value-matched Lua release, and a background
//! renewal timer that stops itself the instant it can no longer prove
//! ownership (spec §9 "Background timers for lock renewal").

use super::script::LockScripts;
use anyhow::Result;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out waiting for lock {0}")]
    Timeout(String),
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// A held lock. Dropping this without calling [`LockHandle::release`] leaves
/// the key to expire on its own TTL — safe, just slower to free up.
#[derive(Clone)]
pub struct LockHandle {
    conn: ConnectionManager,
    scripts: LockScripts,
    key: String,
    value: String,
}

impl LockHandle {
    /// Single-attempt acquisition: `SET key value EX ttl NX`. Returns `None`
    /// if another holder already has it (spec §4.2 step 1: "If not acquired,
    /// return silently").
    pub async fn try_acquire(
        mut conn: ConnectionManager,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>, LockError> {
        let key = key.into();
        let value = Uuid::new_v4().to_string();
        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(&value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .arg("NX")
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !acquired {
            return Ok(None);
        }
        Ok(Some(Self {
            conn,
            scripts: LockScripts::new(),
            key,
            value,
        }))
    }

    /// Polls [`Self::try_acquire`] every `poll_interval` until `wait_timeout`
    /// elapses (spec §4.6 "polled every lockPollIntervalMs up to
    /// lockWaitTimeoutSec").
    pub async fn acquire_with_wait(
        conn: ConnectionManager,
        key: impl Into<String>,
        ttl: Duration,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Result<Self, LockError> {
        let key = key.into();
        let deadline = tokio::time::Instant::now() + wait_timeout;
        loop {
            if let Some(handle) =
                Self::try_acquire(conn.clone(), key.clone(), ttl).await?
            {
                return Ok(handle);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LockError::Timeout(key));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value-matched delete: never deletes another holder's key (spec P4).
    pub async fn release(mut self) -> Result<(), LockError> {
        self.scripts
            .release
            .key(&self.key)
            .arg(&self.value)
            .invoke_async::<i64>(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Extends the TTL only if this handle's value still matches what's
    /// stored. Returns `false` the instant ownership can no longer be proven
    /// (lost to expiry, or another holder grabbed the key).
    async fn renew_once(&mut self, ttl: Duration) -> Result<bool, LockError> {
        let renewed: i64 = self
            .scripts
            .renew
            .key(&self.key)
            .arg(&self.value)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut self.conn)
            .await?;
        Ok(renewed == 1)
    }

    /// Spawns a background renewal timer bound to a clone of this lock and
    /// returns a cancel handle (spec §9: "on acquisition return a cancel
    /// handle... on renewal error, stop the timer"). Takes `&self` rather
    /// than consuming it so the caller keeps the original handle around for
    /// a real value-matched [`release`](Self::release) later (spec §4.6
    /// "Release: Lua script deletes the key only if the value matches") —
    /// the caller must not assume continued ownership past the point
    /// `is_lost()` flips true.
    pub fn spawn_renewal(&self, ttl: Duration, interval: Duration) -> RenewalHandle {
        let lost = Arc::new(AtomicBool::new(false));
        let lost_writer = lost.clone();
        let key = self.key.clone();
        let mut renewer = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match renewer.renew_once(ttl).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tracing::warn!(lock_key = %key, "lock renewal lost ownership, stopping");
                        lost_writer.store(true, Ordering::SeqCst);
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(lock_key = %key, %error, "lock renewal failed, stopping");
                        lost_writer.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            }
        });
        RenewalHandle {
            task,
            lost,
        }
    }
}

/// Handle to a background renewal timer. Drop to detach (the timer keeps
/// running until it next observes lost ownership); call [`cancel`] to stop
/// it immediately.
pub struct RenewalHandle {
    task: JoinHandle<()>,
    lost: Arc<AtomicBool>,
}

impl RenewalHandle {
    /// `true` once the renewal timer has observed it no longer owns the lock.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

/// `lock:schedule:scan` (spec §4.2, §6).
pub fn schedule_scan_key() -> String {
    "lock:schedule:scan".to_string()
}

/// `lock:execute:{uid}:{canvasId}` — outer execute lock (spec §4.6, §6).
pub fn execute_lock_key(uid: &str, canvas_id: &str) -> String {
    format!("lock:execute:{uid}:{canvas_id}")
}

/// `lock:sandbox:{sandboxId}` — inner sandbox lock (spec §4.6, §6).
pub fn sandbox_lock_key(sandbox_id: &str) -> String {
    format!("lock:sandbox:{sandbox_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_builders_match_spec_conventions() {
        assert_eq!(schedule_scan_key(), "lock:schedule:scan");
        assert_eq!(execute_lock_key("u1", "c1"), "lock:execute:u1:c1");
        assert_eq!(sandbox_lock_key("sbx_1"), "lock:sandbox:sbx_1");
    }
}
