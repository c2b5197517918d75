//! Type-mode lattice and schema entries (§3, §4.3).
//!
//! A [`Schema`] is a map from normalized path to [`SchemaEntry`]. The widening
//! operator [`widen`] is the heart of the schema reducer: it is commutative,
//! associative, and idempotent, and `forced` entries are its fixpoints.

use ordermap::OrderMap;
use serde::{Deserialize, Serialize};

use crate::store::SchemaStore;
use crate::Result;

/// The closed set of logical base types (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Record,
    String,
    Integer,
    Float,
    Boolean,
}

/// Nullable (scalar/record field) vs repeated (array) (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Nullable,
    Repeated,
}

/// A (base_type, mode) pair — the element of the widening lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMode {
    pub base_type: BaseType,
    pub mode: Mode,
}

impl TypeMode {
    pub const fn new(base_type: BaseType, mode: Mode) -> Self {
        Self { base_type, mode }
    }
}

/// One entry of the Schema: a path's resolved type, plus whether an operator
/// policy has pinned it (§3, §4.3 "Forced override").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub path: String,
    pub type_mode: TypeMode,
    pub forced: bool,
}

/// A resolved, read-only snapshot of the Schema Store's field entries, keyed
/// by path, as consumed by the shredder and materializer (§4.5, §4.6).
pub type ResolvedSchema = OrderMap<String, SchemaEntry>;

/// Takes a consistent read of every field entry currently in `store`.
pub fn snapshot(store: &dyn SchemaStore) -> Result<ResolvedSchema> {
    let mut schema = ResolvedSchema::new();
    for entry in store.all_fields()? {
        schema.insert(entry.path.clone(), entry);
    }
    Ok(schema)
}

/// The type-widening lattice operator ⊔ (§4.3). Rules are applied in order;
/// the first match wins.
pub fn widen(a: TypeMode, b: TypeMode) -> TypeMode {
    use BaseType::*;
    use Mode::*;

    if a == b {
        return a;
    }
    let pair = [a, b];

    if pair.contains(&TypeMode::new(Record, Repeated)) {
        return TypeMode::new(Record, Repeated);
    }
    if pair.contains(&TypeMode::new(String, Repeated)) {
        return TypeMode::new(String, Repeated);
    }
    if pair.iter().all(|t| t.mode == Repeated) {
        return TypeMode::new(String, Repeated);
    }
    if pair.contains(&TypeMode::new(Record, Nullable)) {
        return TypeMode::new(Record, Nullable);
    }
    if pair.contains(&TypeMode::new(String, Nullable)) {
        return TypeMode::new(String, Nullable);
    }
    if pair
        .iter()
        .all(|t| t.mode == Nullable && matches!(t.base_type, Float | Integer))
    {
        return TypeMode::new(Float, Nullable);
    }
    TypeMode::new(String, Nullable)
}
