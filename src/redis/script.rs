//! Lua scripts shared by the lock and rate-limit modules, bundled the way
//! `other_examples/apalis-redis/storage.rs`'s `RedisScript` struct bundles
//! its named `Script` instances.

use redis::Script;

#[derive(Clone)]
pub struct LockScripts {
    /// Deletes `KEYS[1]` only if its value equals `ARGV[1]`. Used for both
    /// release and as the basis for renewal (spec §4.6: "matched-value
    /// release prevents accidental release of another holder's lock").
    pub release: Script,
    /// Extends `KEYS[1]`'s TTL to `ARGV[2]` seconds only if its value still
    /// equals `ARGV[1]`.
    pub renew: Script,
}

impl LockScripts {
    pub fn new() -> Self {
        Self {
            release: Script::new(
                r#"
                if redis.call("GET", KEYS[1]) == ARGV[1] then
                    return redis.call("DEL", KEYS[1])
                else
                    return 0
                end
                "#,
            ),
            renew: Script::new(
                r#"
                if redis.call("GET", KEYS[1]) == ARGV[1] then
                    return redis.call("EXPIRE", KEYS[1], ARGV[2])
                else
                    return 0
                end
                "#,
            ),
        }
    }
}

impl Default for LockScripts {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct CounterScripts {
    /// Atomically increments `KEYS[1]`, setting its TTL to `ARGV[1]` seconds
    /// only on the increment that creates the key (so a crash between INCR
    /// and EXPIRE can't leave a permanent counter).
    pub incr_with_ttl: Script,
}

impl CounterScripts {
    pub fn new() -> Self {
        Self {
            incr_with_ttl: Script::new(
                r#"
                local count = redis.call("INCR", KEYS[1])
                if count == 1 then
                    redis.call("EXPIRE", KEYS[1], ARGV[1])
                end
                return count
                "#,
            ),
        }
    }
}

impl Default for CounterScripts {
    fn default() -> Self {
        Self::new()
    }
}
