//! Variable Normalizer (spec §4.4, component C4): merges a trigger payload's
//! duck-typed `variables` bag with the canvas's declared `WorkflowVariable[]`
//! into one normalized, aligned array. Spec §9 calls out "duck-typed payload
//! variables" as a redesign note: "normalize by capability rather than
//! shape... prefer an explicit tagged variant internally."

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticFileInfo {
    pub original_name: String,
    pub content_type: String,
}

/// Looks up `StaticFile` rows by storage key (spec §4.4: "fetch StaticFile
/// rows (originalName, contentType) to fill name and fileType").
#[async_trait]
pub trait StaticFileLookup: Send + Sync {
    async fn by_storage_key(&self, storage_key: &str) -> anyhow::Result<Option<StaticFileInfo>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowVariable {
    pub variable_id: Option<String>,
    pub name: String,
    pub variable_type: String,
    /// One or more resolved values (spec §4.4: an array-of-storage-keys
    /// runtime entry fans out to multiple `resource` values; everything
    /// else normalizes to exactly one).
    pub value: Vec<VariableValue>,
}

/// The explicit tagged internal representation spec §9 recommends over the
/// flexible external duck-typed form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum VariableValue {
    Text(String),
    Resource {
        name: String,
        file_type: String,
        storage_key: String,
    },
    Tagged(Value),
}

/// Classifies the file type from a content type prefix (spec §4.4:
/// "image/*|video/*|audio/*|else=document").
fn classify_file_type(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") {
        "video"
    } else if content_type.starts_with("audio/") {
        "audio"
    } else {
        "document"
    }
}

fn storage_key_for(uid: &str, raw: &str) -> Option<String> {
    let prefix = format!("openapi/{uid}/");
    raw.starts_with(&prefix).then(|| raw.to_string())
}

async fn normalize_single_value(
    uid: &str,
    raw: &Value,
    files: &dyn StaticFileLookup,
) -> VariableValue {
    if let Value::String(s) = raw {
        if let Some(storage_key) = storage_key_for(uid, s) {
            return resolve_resource(storage_key, files).await;
        }
    }
    if let Value::Object(map) = raw {
        if map.contains_key("type") {
            return VariableValue::Tagged(raw.clone());
        }
    }
    VariableValue::Text(stringify(raw))
}

async fn resolve_resource(storage_key: String, files: &dyn StaticFileLookup) -> VariableValue {
    let info = files.by_storage_key(&storage_key).await.ok().flatten();
    match info {
        Some(info) => VariableValue::Resource {
            name: info.original_name,
            file_type: classify_file_type(&info.content_type).to_string(),
            storage_key,
        },
        None => VariableValue::Resource {
            name: storage_key.clone(),
            file_type: "document".to_string(),
            storage_key,
        },
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}

/// Normalizes one raw payload entry per spec §4.4's per-entry rules. Returns
/// one or more values since an array-of-storage-keys entry fans out to
/// multiple `resource` values.
async fn normalize_entry(uid: &str, raw: &Value, files: &dyn StaticFileLookup) -> Vec<VariableValue> {
    if let Value::Array(items) = raw {
        let all_resource_strings = !items.is_empty()
            && items.iter().all(|item| {
                matches!(item, Value::String(s) if storage_key_for(uid, s).is_some())
            });
        if all_resource_strings {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                if let Value::String(s) = item {
                    if let Some(key) = storage_key_for(uid, s) {
                        resolved.push(resolve_resource(key, files).await);
                    }
                }
            }
            return resolved;
        }

        let all_tagged_objects = !items.is_empty()
            && items
                .iter()
                .all(|item| matches!(item, Value::Object(map) if map.contains_key("type")));
        if all_tagged_objects {
            return items.iter().map(|item| VariableValue::Tagged(item.clone())).collect();
        }

        return vec![VariableValue::Text(stringify(raw))];
    }

    vec![normalize_single_value(uid, raw, files).await]
}

/// Produces the merged `WorkflowVariable[]` (spec §4.4 "Merge with canvas
/// variables by name"). `declared` is the canvas's `WorkflowVariable[]`,
/// `runtime` is the trigger payload's `variables` bag.
pub async fn normalize(
    uid: &str,
    declared: &[WorkflowVariable],
    runtime: &HashMap<String, Value>,
    files: &dyn StaticFileLookup,
) -> Vec<WorkflowVariable> {
    let mut by_name: HashMap<&str, &WorkflowVariable> =
        declared.iter().map(|v| (v.name.as_str(), v)).collect();

    let mut merged = Vec::with_capacity(declared.len());
    for declared_var in declared {
        if let Some(raw) = runtime.get(&declared_var.name) {
            let values = normalize_entry(uid, raw, files).await;
            merged.push(WorkflowVariable {
                variable_id: declared_var.variable_id.clone(),
                name: declared_var.name.clone(),
                variable_type: declared_var.variable_type.clone(),
                value: values,
            });
        } else {
            merged.push(declared_var.clone());
        }
        by_name.remove(declared_var.name.as_str());
    }

    // Spec §4.4: "Unnamed runtime entries are dropped" — only entries whose
    // name matches a declared variable ever reach the merged array, which
    // the loop above already guarantees; nothing further to append here.
    let _ = by_name;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFiles;

    #[async_trait]
    impl StaticFileLookup for NoFiles {
        async fn by_storage_key(&self, _storage_key: &str) -> anyhow::Result<Option<StaticFileInfo>> {
            Ok(None)
        }
    }

    struct FakeFiles(HashMap<String, StaticFileInfo>);

    #[async_trait]
    impl StaticFileLookup for FakeFiles {
        async fn by_storage_key(&self, storage_key: &str) -> anyhow::Result<Option<StaticFileInfo>> {
            Ok(self.0.get(storage_key).cloned())
        }
    }

    fn declared(name: &str, variable_type: &str) -> WorkflowVariable {
        WorkflowVariable {
            variable_id: Some(format!("{name}-id")),
            name: name.to_string(),
            variable_type: variable_type.to_string(),
            value: vec![VariableValue::Text(String::new())],
        }
    }

    #[tokio::test]
    async fn primitive_values_are_stringified() {
        let declared_vars = vec![declared("count", "number")];
        let mut runtime = HashMap::new();
        runtime.insert("count".to_string(), serde_json::json!(42));
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(merged[0].value, vec![VariableValue::Text("42".to_string())]);
    }

    #[tokio::test]
    async fn null_stringifies_to_empty_string() {
        let declared_vars = vec![declared("input", "text")];
        let mut runtime = HashMap::new();
        runtime.insert("input".to_string(), Value::Null);
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(merged[0].value, vec![VariableValue::Text(String::new())]);
    }

    #[tokio::test]
    async fn storage_key_values_become_resource_variables() {
        let declared_vars = vec![declared("photo", "resource")];
        let mut runtime = HashMap::new();
        runtime.insert(
            "photo".to_string(),
            serde_json::json!("openapi/u1/of_abc123"),
        );
        let mut files = HashMap::new();
        files.insert(
            "openapi/u1/of_abc123".to_string(),
            StaticFileInfo {
                original_name: "photo.png".into(),
                content_type: "image/png".into(),
            },
        );
        let merged = normalize("u1", &declared_vars, &runtime, &FakeFiles(files)).await;
        assert_eq!(
            merged[0].value,
            vec![VariableValue::Resource {
                name: "photo.png".into(),
                file_type: "image".into(),
                storage_key: "openapi/u1/of_abc123".into(),
            }]
        );
    }

    #[tokio::test]
    async fn array_of_storage_keys_fans_out_to_multiple_resources() {
        let declared_vars = vec![declared("photos", "resource")];
        let mut runtime = HashMap::new();
        runtime.insert(
            "photos".to_string(),
            serde_json::json!(["openapi/u1/of_a", "openapi/u1/of_b"]),
        );
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(
            merged[0].value,
            vec![
                VariableValue::Resource {
                    name: "openapi/u1/of_a".into(),
                    file_type: "document".into(),
                    storage_key: "openapi/u1/of_a".into(),
                },
                VariableValue::Resource {
                    name: "openapi/u1/of_b".into(),
                    file_type: "document".into(),
                    storage_key: "openapi/u1/of_b".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn tagged_object_values_pass_through() {
        let declared_vars = vec![declared("opts", "custom")];
        let mut runtime = HashMap::new();
        runtime.insert("opts".to_string(), serde_json::json!({"type": "custom", "x": 1}));
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(
            merged[0].value,
            vec![VariableValue::Tagged(serde_json::json!({"type": "custom", "x": 1}))]
        );
    }

    #[tokio::test]
    async fn unnamed_runtime_entries_are_dropped() {
        let declared_vars = vec![declared("known", "text")];
        let mut runtime = HashMap::new();
        runtime.insert("known".to_string(), serde_json::json!("hi"));
        runtime.insert("unknown".to_string(), serde_json::json!("ignored"));
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "known");
    }

    #[tokio::test]
    async fn declared_variable_id_and_type_win_over_runtime() {
        let declared_vars = vec![declared("known", "text")];
        let mut runtime = HashMap::new();
        runtime.insert("known".to_string(), serde_json::json!("hi"));
        let merged = normalize("u1", &declared_vars, &runtime, &NoFiles).await;
        assert_eq!(merged[0].variable_id, Some("known-id".to_string()));
        assert_eq!(merged[0].variable_type, "text");
    }
}
