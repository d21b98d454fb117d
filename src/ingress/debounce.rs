//! Request-fingerprint debouncing (spec §4.3 "Debounce", P6).

use crate::common::entity_ids::Uid;
use crate::redis::counters::set_if_absent;
use redis::aio::ConnectionManager;
use serde_json::Value;
use std::time::Duration;

/// `md5(uid ":" scopeId ":" canonicalJSON(body))` (spec §4.3). `scopeId` is
/// `canvasId` for the API surface or `webhookId` for the webhook surface.
pub fn fingerprint(uid: &Uid, scope_id: &str, body: &Value) -> String {
    let canonical = canonical_json(body);
    let input = format!("{uid}:{scope_id}:{canonical}");
    format!("{:x}", md5::compute(input))
}

/// Serializes with object keys sorted so semantically-identical bodies with
/// differently-ordered fields fingerprint the same.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort(v))).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// `true` if this is the first request with this fingerprint within the
/// debounce window (spec §4.3, P6). Fail-open on Redis errors. `namespace`
/// is `"openapi:debounce"` or `"webhook_debounce"` per spec §6's key
/// conventions.
pub async fn check_and_mark(conn: &mut ConnectionManager, namespace: &str, fingerprint: &str, ttl: Duration) -> bool {
    let key = format!("{namespace}:{fingerprint}");
    match set_if_absent(conn, &key, ttl).await {
        Ok(is_first) => is_first,
        Err(error) => {
            tracing::warn!(%error, %fingerprint, "debounce check failed, failing open");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_stable_for_identical_body() {
        let uid = Uid::new();
        let body = json!({"a": 1, "b": 2});
        assert_eq!(fingerprint(&uid, "scope", &body), fingerprint(&uid, "scope", &body));
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let uid = Uid::new();
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(fingerprint(&uid, "scope", &a), fingerprint(&uid, "scope", &b));
    }

    #[test]
    fn fingerprint_differs_across_scopes() {
        let uid = Uid::new();
        let body = json!({"a": 1});
        assert_ne!(fingerprint(&uid, "scope-1", &body), fingerprint(&uid, "scope-2", &body));
    }
}
