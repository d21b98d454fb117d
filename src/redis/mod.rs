//! Redis primitives (spec §2 L1): single-key distributed locks, atomic
//! counters, and the Lua scripts backing both. Grounded in
//! `other_examples/apalis-redis/storage.rs`'s `connect()` helper and its
//! bundled-`Script` pattern (`RedisScript { ack_job, enqueue_scheduled, ... }`)
//! since no example repo in the pack depends on the `redis` crate directly.

pub mod counters;
pub mod lock;
pub mod script;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo};

/// Opens a connection manager, the same one-liner `apalis-redis` exposes as
/// `connect()`. `ConnectionManager` transparently reconnects, so this is
/// called once at boot and the handle is cloned into every subsystem.
pub async fn connect<S: IntoConnectionInfo>(redis_url: S) -> Result<ConnectionManager> {
    let client = Client::open(redis_url.into_connection_info()?).context("invalid redis url")?;
    let conn = client
        .get_connection_manager()
        .await
        .context("failed to connect to redis")?;
    Ok(conn)
}
