//! Relational Shredder (§4.5): given the resolved Schema and a document,
//! produces one root row plus one child-table row per element of each
//! repeated field, linked by content-addressed `hash_code`/`parent_hash_code`.
//!
//! The walker recurses with a bounded depth (`RunConfig.max_depth`) rather
//! than an explicit stack, per the Design Notes' "bounded-depth recursion"
//! alternative — unlike the observer, each call here must merge a returned
//! row and fragment map back into its caller's, which is far more direct to
//! express as a return value than to thread through an explicit work stack.

use std::fmt::Write as _;

use ordermap::OrderMap;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use crate::config::{ProcessArrayPolicy, RunConfig};
use crate::error::RejectionReason;
use crate::path::normalize_path;
use crate::schema::{BaseType, Mode, ResolvedSchema};

/// A single scalar cell of a row fragment (§3 "Row fragment").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl ScalarValue {
    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Null => Value::Null,
            ScalarValue::String(s) => Value::String(s.clone()),
            ScalarValue::Integer(i) => Value::Number((*i).into()),
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ScalarValue::Boolean(b) => Value::Bool(*b),
        }
    }
}

/// A flat mapping from column name to scalar value (§3 "Row fragment").
pub type Row = OrderMap<String, ScalarValue>;

/// `fragment_id → rows` produced by shredding one document (§4.5).
pub type FragmentMap = OrderMap<String, Vec<Row>>;

/// Everything the orchestrator needs to register and persist after
/// successfully shredding one document.
#[derive(Debug, Clone)]
pub struct ShredOutcome {
    pub fragments: FragmentMap,
    pub hash_code: String,
    pub shard_value: Option<String>,
}

/// Recursively produces the canonical-JSON form of `value`: object keys
/// sorted at every level (§3 "hash_code ... keys sorted").
fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonical_json(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// `hash_code(doc) = SHA-1(canonical-JSON(doc))`, hex-encoded (§3, §8 "Hash
/// determinism").
pub fn hash_code_of(value: &Value) -> String {
    let canonical = canonical_json(value);
    let serialized = serde_json::to_vec(&canonical).expect("canonical JSON always serializes");
    let digest = Sha1::digest(&serialized);
    to_hex(&digest)
}

/// Dotted-path lookup into a raw JSON document (distinct from schema-path
/// normalization): used for `shard_key` extraction and `required` policy
/// checks, both of which are expressed against the document's own key
/// nesting rather than the normalized Schema path (§4.5 step 3, §6
/// `policies[]`).
fn lookup_dotted_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_empty_container(value: &Value) -> bool {
    matches!(value, Value::Object(m) if m.is_empty()) || matches!(value, Value::Array(a) if a.is_empty())
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Coerces `value` to `target` per §4.5 "Coercion".
fn coerce_scalar(value: &Value, target: BaseType) -> std::result::Result<ScalarValue, String> {
    match target {
        BaseType::String => Ok(ScalarValue::String(scalar_to_string(value))),
        BaseType::Integer => value
            .as_i64()
            .map(ScalarValue::Integer)
            .ok_or_else(|| format!("{value} is not representable as a 64-bit integer")),
        BaseType::Float => value
            .as_f64()
            .map(ScalarValue::Float)
            .ok_or_else(|| format!("{value} is not representable as a float")),
        BaseType::Boolean => Ok(ScalarValue::Boolean(match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })),
        BaseType::Record => Err("cannot coerce a scalar value to record".to_string()),
    }
}

fn extract_shard_value(
    doc: &Value,
    shard_key: &str,
    max_len: usize,
) -> std::result::Result<String, RejectionReason> {
    let value = lookup_dotted_path(doc, shard_key).ok_or_else(|| {
        RejectionReason::PolicyRejection(format!("missing shard key {shard_key}"))
    })?;
    let raw = match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            return Err(RejectionReason::PolicyRejection(format!(
                "shard key {shard_key} is missing, empty, or not a scalar"
            )))
        }
    };
    let normalized = crate::path::normalize_segment(&raw)
        .map_err(|e| RejectionReason::PolicyRejection(format!("shard key {shard_key}: {e}")))?;
    if normalized.len() > max_len {
        return Err(RejectionReason::PolicyRejection(format!(
            "shard value {normalized:?} exceeds max length {max_len}"
        )));
    }
    Ok(normalized)
}

fn merge_fragment_map(into: &mut FragmentMap, other: FragmentMap) {
    for (id, mut rows) in other {
        into.entry(id).or_default().append(&mut rows);
    }
}

/// Shreds one object's fields into a row plus any child fragments produced
/// by its repeated descendants (§4.5 step 4). `row_hash` is the `hash_code`
/// of the nearest enclosing emitted row (root, or the current repeated-record
/// element); it is threaded unchanged through nullable object nesting and
/// only changes when a new repeated-record element is entered.
fn shred_object(
    obj: &Map<String, Value>,
    schema: &ResolvedSchema,
    config: &RunConfig,
    parent_path: Option<&str>,
    parent_is_array: bool,
    row_hash: &str,
    depth: usize,
) -> std::result::Result<(Row, FragmentMap), RejectionReason> {
    let mut row = Row::new();
    let mut fragments = FragmentMap::new();

    if depth > config.max_depth {
        tracing::warn!(depth, "max depth exceeded while shredding, truncating subtree");
        return Ok((row, fragments));
    }

    for (key, value) in obj {
        if matches!(value, Value::Null) || is_empty_container(value) {
            continue;
        }

        let np = normalize_path(key, parent_path, parent_is_array)
            .map_err(|e| RejectionReason::SchemaConflict(e.to_string()))?;

        let Some(entry) = schema.get(&np.full_path) else {
            tracing::debug!(path = %np.full_path, "path not in resolved schema, skipping field");
            continue;
        };

        match (entry.type_mode.base_type, entry.type_mode.mode) {
            (BaseType::Record, Mode::Nullable) => {
                let child_obj = value.as_object().ok_or_else(|| {
                    RejectionReason::SchemaConflict(format!("{}: expected an object", np.full_path))
                })?;
                let (child_row, child_fragments) = shred_object(
                    child_obj,
                    schema,
                    config,
                    Some(&np.full_path),
                    false,
                    row_hash,
                    depth + 1,
                )?;
                for (col, val) in child_row {
                    row.insert(col, val);
                }
                merge_fragment_map(&mut fragments, child_fragments);
            }
            (BaseType::Record, Mode::Repeated) => {
                let arr = value.as_array().ok_or_else(|| {
                    RejectionReason::SchemaConflict(format!("{}: expected an array", np.full_path))
                })?;
                match config.process_array {
                    ProcessArrayPolicy::JsonString => {
                        row.insert(np.column_name.clone(), ScalarValue::String(value.to_string()));
                    }
                    ProcessArrayPolicy::ChildTable => {
                        for elem in arr {
                            let elem_obj = elem.as_object().ok_or_else(|| {
                                RejectionReason::SchemaConflict(format!(
                                    "{}: expected an object element",
                                    np.full_path
                                ))
                            })?;
                            let elem_hash = hash_code_of(elem);
                            let (mut elem_row, elem_fragments) = shred_object(
                                elem_obj,
                                schema,
                                config,
                                Some(&np.full_path),
                                true,
                                &elem_hash,
                                depth + 1,
                            )?;
                            elem_row.insert("hash_code".to_string(), ScalarValue::String(elem_hash));
                            elem_row.insert(
                                "parent_hash_code".to_string(),
                                ScalarValue::String(row_hash.to_string()),
                            );
                            fragments.entry(np.full_path.clone()).or_default().push(elem_row);
                            merge_fragment_map(&mut fragments, elem_fragments);
                        }
                    }
                }
            }
            (base_type, Mode::Nullable) => match coerce_scalar(value, base_type) {
                Ok(scalar) => {
                    row.insert(np.column_name.clone(), scalar);
                }
                Err(_) if entry.forced => {
                    row.insert(np.column_name.clone(), ScalarValue::Null);
                }
                Err(reason) => {
                    return Err(RejectionReason::TypeCoercionFailure(format!(
                        "{}: {reason}",
                        np.full_path
                    )))
                }
            },
            (base_type, Mode::Repeated) => match config.process_array {
                ProcessArrayPolicy::JsonString => {
                    row.insert(np.column_name.clone(), ScalarValue::String(value.to_string()));
                }
                ProcessArrayPolicy::ChildTable => {
                    let arr = value.as_array().ok_or_else(|| {
                        RejectionReason::SchemaConflict(format!("{}: expected an array", np.full_path))
                    })?;
                    for elem in arr {
                        if elem.is_null() {
                            continue;
                        }
                        let scalar = match coerce_scalar(elem, base_type) {
                            Ok(scalar) => scalar,
                            Err(_) if entry.forced => ScalarValue::Null,
                            Err(reason) => {
                                return Err(RejectionReason::TypeCoercionFailure(format!(
                                    "{}: {reason}",
                                    np.full_path
                                )))
                            }
                        };
                        let mut child_row = Row::new();
                        child_row.insert("value".to_string(), scalar);
                        child_row.insert(
                            "parent_hash_code".to_string(),
                            ScalarValue::String(row_hash.to_string()),
                        );
                        fragments.entry(np.full_path.clone()).or_default().push(child_row);
                    }
                }
            },
        }
    }

    Ok((row, fragments))
}

/// Shreds one document into its fragment map per §4.5. Rejects the document
/// (rather than returning a partial result) on any `RejectionReason`.
pub fn shred_document(
    doc: &Value,
    schema: &ResolvedSchema,
    config: &RunConfig,
) -> std::result::Result<ShredOutcome, RejectionReason> {
    for policy in &config.policies {
        if policy.required && lookup_dotted_path(doc, &policy.path).is_none() {
            return Err(RejectionReason::PolicyRejection(format!(
                "Missing {}",
                policy.path
            )));
        }
    }

    let obj = doc
        .as_object()
        .ok_or_else(|| RejectionReason::SchemaConflict("document root is not an object".into()))?;

    let hash_code = hash_code_of(doc);

    let shard_value = match &config.shard_key {
        Some(shard_key) => Some(extract_shard_value(doc, shard_key, config.max_shard_value_len)?),
        None => None,
    };

    let (mut root_row, mut fragments) =
        shred_object(obj, schema, config, None, false, &hash_code, 0)?;
    root_row.insert("hash_code".to_string(), ScalarValue::String(hash_code.clone()));

    let root_fragment_id = match &shard_value {
        Some(v) => format!("root/{v}"),
        None => "root".to_string(),
    };
    fragments.entry(root_fragment_id).or_default().push(root_row);

    Ok(ShredOutcome {
        fragments,
        hash_code,
        shard_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::schema::{SchemaEntry, TypeMode};
    use serde_json::json;

    fn entry(path: &str, bt: BaseType, mode: Mode) -> SchemaEntry {
        SchemaEntry {
            path: path.to_string(),
            type_mode: TypeMode::new(bt, mode),
            forced: false,
        }
    }

    fn schema_of(entries: Vec<SchemaEntry>) -> ResolvedSchema {
        let mut schema = ResolvedSchema::new();
        for e in entries {
            schema.insert(e.path.clone(), e);
        }
        schema
    }

    #[test]
    fn hash_code_is_deterministic_under_key_reordering() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(hash_code_of(&a), hash_code_of(&b));
    }

    #[test]
    fn flat_scalar_only_produces_one_root_row() {
        let schema = schema_of(vec![entry("a", BaseType::String, Mode::Nullable)]);
        let config = RunConfig::default();
        let doc = json!({"a": "x"});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        let root_rows = &outcome.fragments["root"];
        assert_eq!(root_rows.len(), 1);
        assert_eq!(root_rows[0]["a"], ScalarValue::String("x".into()));
        assert!(root_rows[0].contains_key("hash_code"));
    }

    #[test]
    fn nested_object_flattens_into_root_row_without_child_table() {
        let schema = schema_of(vec![
            entry("user", BaseType::Record, Mode::Nullable),
            entry("user_id", BaseType::Integer, Mode::Nullable),
            entry("user_name", BaseType::String, Mode::Nullable),
        ]);
        let config = RunConfig::default();
        let doc = json!({"user": {"id": 7, "name": "Zed"}});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        assert_eq!(outcome.fragments.len(), 1);
        let row = &outcome.fragments["root"][0];
        assert_eq!(row["user_id"], ScalarValue::Integer(7));
        assert_eq!(row["user_name"], ScalarValue::String("Zed".into()));
        assert!(!row.contains_key("user"));
    }

    #[test]
    fn repeated_scalars_produce_child_rows_linked_by_parent_hash() {
        let schema = schema_of(vec![entry("tags", BaseType::String, Mode::Repeated)]);
        let config = RunConfig::default();
        let doc = json!({"tags": ["a", "b"]});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        let root_hash = match &outcome.fragments["root"][0]["hash_code"] {
            ScalarValue::String(s) => s.clone(),
            _ => panic!("hash_code must be a string"),
        };
        let tags = &outcome.fragments["tags"];
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["value"], ScalarValue::String("a".into()));
        assert_eq!(tags[0]["parent_hash_code"], ScalarValue::String(root_hash.clone()));
        assert_eq!(tags[1]["parent_hash_code"], ScalarValue::String(root_hash));
    }

    #[test]
    fn repeated_records_produce_a_child_table_per_element() {
        let schema = schema_of(vec![
            entry("items", BaseType::Record, Mode::Repeated),
            entry("items.sku", BaseType::String, Mode::Nullable),
            entry("items.qty", BaseType::Integer, Mode::Nullable),
        ]);
        let config = RunConfig::default();
        let doc = json!({"items": [{"sku": "x", "qty": 1}, {"sku": "y", "qty": 2}]});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        let items = &outcome.fragments["items"];
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["sku"], ScalarValue::String("x".into()));
        assert_eq!(items[1]["qty"], ScalarValue::Integer(2));
        assert!(items[0].contains_key("hash_code"));
        assert!(items[0].contains_key("parent_hash_code"));
    }

    #[test]
    fn forced_field_coerces_bad_value_to_null_instead_of_rejecting() {
        let config = RunConfig::default();
        let mut code = entry("code", BaseType::Integer, Mode::Nullable);
        code.forced = true;
        let schema = schema_of(vec![code]);
        let doc = json!({"code": "not-a-number"});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        assert_eq!(outcome.fragments["root"][0]["code"], ScalarValue::Null);
    }

    #[test]
    fn unforced_coercion_failure_rejects_document() {
        let schema = schema_of(vec![entry("code", BaseType::Integer, Mode::Nullable)]);
        let config = RunConfig::default();
        let doc = json!({"code": "not-a-number"});
        let err = shred_document(&doc, &schema, &config).unwrap_err();
        assert!(matches!(err, RejectionReason::TypeCoercionFailure(_)));
    }

    #[test]
    fn required_policy_rejects_missing_dotted_path() {
        use crate::config::FieldPolicy;
        let schema = schema_of(vec![entry("user_name", BaseType::String, Mode::Nullable)]);
        let mut config = RunConfig::default();
        config.policies.push(FieldPolicy::new("user.id").required());
        let doc = json!({"user": {"name": "n"}});
        let err = shred_document(&doc, &schema, &config).unwrap_err();
        assert_eq!(err, RejectionReason::PolicyRejection("Missing user.id".to_string()));
    }

    #[test]
    fn shard_key_prefixes_root_fragment_id() {
        let schema = schema_of(vec![entry("tenant", BaseType::String, Mode::Nullable)]);
        let mut config = RunConfig::default();
        config.shard_key = Some("tenant".to_string());
        let doc = json!({"tenant": "acme"});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        assert_eq!(outcome.shard_value.as_deref(), Some("acme"));
        assert!(outcome.fragments.contains_key("root/acme"));
    }

    #[test]
    fn oversized_shard_value_is_rejected() {
        let schema = schema_of(vec![entry("tenant", BaseType::String, Mode::Nullable)]);
        let mut config = RunConfig::default();
        config.shard_key = Some("tenant".to_string());
        config.max_shard_value_len = 4;
        let doc = json!({"tenant": "way-too-long-a-value"});
        let err = shred_document(&doc, &schema, &config).unwrap_err();
        assert!(matches!(err, RejectionReason::PolicyRejection(_)));
    }

    #[test]
    fn json_string_policy_serializes_array_instead_of_child_table() {
        let schema = schema_of(vec![entry("tags", BaseType::String, Mode::Repeated)]);
        let mut config = RunConfig::default();
        config.process_array = ProcessArrayPolicy::JsonString;
        let doc = json!({"tags": ["a", "b"]});
        let outcome = shred_document(&doc, &schema, &config).unwrap();
        assert!(!outcome.fragments.contains_key("tags"));
        let row = &outcome.fragments["root"][0];
        assert_eq!(row["tags"], ScalarValue::String("[\"a\",\"b\"]".into()));
    }
}
