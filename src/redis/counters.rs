//! Atomic counters and the `SET NX EX` debounce primitive shared by the
//! ingress gate (spec §4.3). Counter increments are scripted so the INCR and
//! the first-increment EXPIRE happen as one round trip.

use super::script::CounterScripts;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Atomically increments `key`, setting its TTL to `ttl` only on the
/// increment that creates the key, and returns the new count.
pub async fn incr_with_ttl(
    conn: &mut ConnectionManager,
    key: &str,
    ttl: Duration,
) -> Result<u64, redis::RedisError> {
    let scripts = CounterScripts::new();
    let count: u64 = scripts
        .incr_with_ttl
        .key(key)
        .arg(ttl.as_secs().max(1))
        .invoke_async(conn)
        .await?;
    Ok(count)
}

/// `SET key 1 EX ttl NX` — returns `true` if the key was just set (i.e. this
/// is the first request with this fingerprint), `false` if it already
/// existed (a duplicate within the debounce window, spec §4.3/P6).
pub async fn set_if_absent(
    conn: &mut ConnectionManager,
    key: &str,
    ttl: Duration,
) -> Result<bool, redis::RedisError> {
    let set: Option<String> = redis::cmd("SET")
        .arg(key)
        .arg(1)
        .arg("EX")
        .arg(ttl.as_secs().max(1))
        .arg("NX")
        .query_async(conn)
        .await?;
    Ok(set.is_some())
}
