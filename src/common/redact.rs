//! Sensitive-field redaction for request/response logging and audit storage
//! (spec §7: "Sensitive data in headers/bodies is redacted").

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

const REDACTED_HEADER_NAMES: &[&str] = &["authorization", "x-api-key", "cookie", "set-cookie"];

lazy_static! {
    static ref SENSITIVE_FIELD_PATTERN: Regex =
        Regex::new(r"(?i)secret|token|.*key$|password").expect("static redaction pattern is valid");
}

/// Shows a 4-char prefix of a sensitive value followed by `[REDACTED]`, the
/// way spec §7 specifies ("show 4-char prefix plus `[REDACTED]`").
pub fn redact_value(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}[REDACTED]")
}

fn header_is_sensitive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    REDACTED_HEADER_NAMES.contains(&lower.as_str())
}

fn field_is_sensitive(name: &str) -> bool {
    SENSITIVE_FIELD_PATTERN.is_match(name)
}

/// Redacts a header map before it's persisted to an `ApiCallRecord` or logged.
pub fn redact_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            if header_is_sensitive(k) {
                (k.clone(), redact_value(v))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

/// Recursively redacts object keys that look like secrets/tokens/passwords in
/// a JSON body before it's persisted.
pub fn redact_json_body(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(k, v)| {
                    if field_is_sensitive(k) {
                        let shown = match v {
                            Value::String(s) => Value::String(redact_value(s)),
                            other => Value::String(redact_value(&other.to_string())),
                        };
                        (k.clone(), shown)
                    } else {
                        (k.clone(), redact_json_body(v))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json_body).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redact_value_keeps_4_char_prefix() {
        assert_eq!(redact_value("sk-abcdef123456"), "sk-a[REDACTED]");
    }

    #[test]
    fn redact_value_handles_short_strings() {
        assert_eq!(redact_value("ab"), "ab[REDACTED]");
    }

    #[test]
    fn redact_headers_masks_authorization() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer sk-12345".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());
        let redacted = redact_headers(&headers);
        assert_eq!(redacted["Authorization"], "Bear[REDACTED]");
        assert_eq!(redacted["content-type"], "application/json");
    }

    #[test]
    fn redact_json_body_masks_nested_secrets() {
        let body = json!({
            "apiKey": "sk-123456",
            "nested": { "password": "hunter2", "name": "ok" }
        });
        let redacted = redact_json_body(&body);
        assert_eq!(redacted["apiKey"], json!("sk-1[REDACTED]"));
        assert_eq!(redacted["nested"]["password"], json!("hunt[REDACTED]"));
        assert_eq!(redacted["nested"]["name"], json!("ok"));
    }
}
