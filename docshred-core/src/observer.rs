//! Schema Observer / Mapper (§4.2): walks one JSON document and emits
//! `(path, type_mode)` observations for the Schema Reducer to fold.
//!
//! The walker is an explicit stack (Design Notes §9 "unbounded recursion over
//! nested JSON") rather than direct call-stack recursion, so a pathologically
//! deep document cannot exhaust the stack; `max_depth` bounds how far it goes.

use serde_json::Value;

use crate::path::normalize_path;
use crate::schema::{BaseType, Mode, TypeMode};

/// One (path, type_mode) observation emitted while walking a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: String,
    pub type_mode: TypeMode,
}

impl Observation {
    fn new(path: String, type_mode: TypeMode) -> Self {
        Self { path, type_mode }
    }
}

struct WorkItem<'a> {
    key: &'a str,
    value: &'a Value,
    parent: Option<String>,
    parent_is_array: bool,
    depth: usize,
}

/// Returns the scalar base type JSON would assign a value (§4.2 "Scalar
/// typing"): booleans → boolean, platform-safe 64-bit integers → integer,
/// other numerics → float, everything else → string.
fn scalar_base_type(value: &Value) -> BaseType {
    match value {
        Value::Bool(_) => BaseType::Boolean,
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                BaseType::Integer
            } else {
                BaseType::Float
            }
        }
        _ => BaseType::String,
    }
}

/// Walks `doc` (which must be a JSON object) and emits one observation per
/// non-empty, non-null field, per the emission table in §4.2.
pub fn observe_document(doc: &Value, max_depth: usize) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut stack: Vec<WorkItem> = Vec::new();

    let Some(root) = doc.as_object() else {
        return observations;
    };
    for (key, value) in root {
        stack.push(WorkItem {
            key,
            value,
            parent: None,
            parent_is_array: false,
            depth: 0,
        });
    }

    while let Some(item) = stack.pop() {
        let np = match normalize_path(item.key, item.parent.as_deref(), item.parent_is_array) {
            Ok(np) => np,
            Err(e) => {
                tracing::warn!(key = item.key, error = %e, "skipping field with unnormalizable key");
                continue;
            }
        };

        if item.depth >= max_depth {
            tracing::warn!(path = %np.full_path, max_depth, "max depth exceeded, observing as string");
            observations.push(Observation::new(
                np.full_path,
                TypeMode::new(BaseType::String, Mode::Nullable),
            ));
            continue;
        }

        match item.value {
            Value::Null => {}
            Value::Bool(_) => observations.push(Observation::new(
                np.full_path,
                TypeMode::new(BaseType::Boolean, Mode::Nullable),
            )),
            Value::Number(_) => observations.push(Observation::new(
                np.full_path,
                TypeMode::new(scalar_base_type(item.value), Mode::Nullable),
            )),
            Value::String(_) => observations.push(Observation::new(
                np.full_path,
                TypeMode::new(BaseType::String, Mode::Nullable),
            )),
            Value::Object(obj) => {
                if obj.is_empty() {
                    continue;
                }
                observations.push(Observation::new(
                    np.full_path.clone(),
                    TypeMode::new(BaseType::Record, Mode::Nullable),
                ));
                for (k, v) in obj {
                    stack.push(WorkItem {
                        key: k,
                        value: v,
                        parent: Some(np.full_path.clone()),
                        parent_is_array: false,
                        depth: item.depth + 1,
                    });
                }
            }
            Value::Array(arr) => {
                if arr.is_empty() {
                    continue;
                }
                if arr.iter().all(|v| v.is_object()) {
                    observations.push(Observation::new(
                        np.full_path.clone(),
                        TypeMode::new(BaseType::Record, Mode::Repeated),
                    ));
                    for elem in arr {
                        if let Some(obj) = elem.as_object() {
                            for (k, v) in obj {
                                stack.push(WorkItem {
                                    key: k,
                                    value: v,
                                    parent: Some(np.full_path.clone()),
                                    parent_is_array: true,
                                    depth: item.depth + 1,
                                });
                            }
                        }
                    }
                } else {
                    for elem in arr {
                        if elem.is_null() {
                            continue;
                        }
                        observations.push(Observation::new(
                            np.full_path.clone(),
                            TypeMode::new(scalar_base_type(elem), Mode::Repeated),
                        ));
                    }
                }
            }
        }
    }

    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn find<'a>(obs: &'a [Observation], path: &str) -> Vec<&'a Observation> {
        obs.iter().filter(|o| o.path == path).collect()
    }

    #[test]
    fn scalar_field_emits_nullable_observation() {
        let doc = json!({"a": 1});
        let obs = observe_document(&doc, 128);
        assert_eq!(find(&obs, "a")[0].type_mode, TypeMode::new(BaseType::Integer, Mode::Nullable));
    }

    #[test]
    fn null_and_empty_containers_emit_nothing() {
        let doc = json!({"a": null, "b": {}, "c": []});
        let obs = observe_document(&doc, 128);
        assert!(obs.is_empty());
    }

    #[test]
    fn nested_object_emits_record_then_children() {
        let doc = json!({"user": {"id": 7, "name": "Zed"}});
        let obs = observe_document(&doc, 128);
        assert_eq!(find(&obs, "user")[0].type_mode, TypeMode::new(BaseType::Record, Mode::Nullable));
        assert_eq!(find(&obs, "user_id")[0].type_mode, TypeMode::new(BaseType::Integer, Mode::Nullable));
        assert_eq!(find(&obs, "user_name")[0].type_mode, TypeMode::new(BaseType::String, Mode::Nullable));
    }

    #[test]
    fn repeated_scalars_join_with_dot_and_repeat() {
        let doc = json!({"tags": ["a", "b"]});
        let obs = observe_document(&doc, 128);
        let tags = find(&obs, "tags");
        assert_eq!(tags.len(), 2);
        for o in tags {
            assert_eq!(o.type_mode, TypeMode::new(BaseType::String, Mode::Repeated));
        }
    }

    #[test]
    fn repeated_records_emit_record_repeated_and_nested_dotted_paths() {
        let doc = json!({"items": [{"sku": "x", "qty": 1}, {"sku": "y", "qty": 2}]});
        let obs = observe_document(&doc, 128);
        assert_eq!(find(&obs, "items")[0].type_mode, TypeMode::new(BaseType::Record, Mode::Repeated));
        assert_eq!(find(&obs, "items.sku").len(), 2);
        assert_eq!(find(&obs, "items.qty").len(), 2);
    }

    #[test]
    fn depth_limit_truncates_to_string() {
        let doc = json!({"a": {"b": {"c": 1}}});
        let obs = observe_document(&doc, 1);
        // "a" observed at depth 0 (allowed), "a_b" at depth 1 hits the limit
        assert_eq!(find(&obs, "a")[0].type_mode, TypeMode::new(BaseType::Record, Mode::Nullable));
        assert_eq!(find(&obs, "a_b")[0].type_mode, TypeMode::new(BaseType::String, Mode::Nullable));
    }
}
