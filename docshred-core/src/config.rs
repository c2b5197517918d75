//! Run configuration: write disposition, array handling, shard key, and
//! per-path policy overrides (§6).

use serde::{Deserialize, Serialize};

/// What to do with existing schema/tables when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// Reset the schema store and drop/recreate tables before loading.
    Overwrite,
    /// Keep existing schema and tables, evolving them as needed.
    Append,
}

impl Default for WriteDisposition {
    fn default() -> Self {
        WriteDisposition::Append
    }
}

/// How repeated-record and repeated-scalar fields are shredded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessArrayPolicy {
    /// Emit one child-table row per array element (§4.5).
    ChildTable,
    /// Serialize the whole array as a JSON string column on the parent row.
    JsonString,
}

impl Default for ProcessArrayPolicy {
    fn default() -> Self {
        ProcessArrayPolicy::ChildTable
    }
}

/// Operator-supplied override for a single path.
///
/// `data_type` pins `forced = true` on the schema entry; `required` rejects
/// any document missing the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPolicy {
    pub path: String,
    pub required: bool,
    pub data_type: Option<crate::schema::BaseType>,
    pub mode: Option<crate::schema::Mode>,
}

impl FieldPolicy {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required: false,
            data_type: None,
            mode: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn forced(mut self, data_type: crate::schema::BaseType, mode: crate::schema::Mode) -> Self {
        self.data_type = Some(data_type);
        self.mode = Some(mode);
        self
    }
}

/// Shard values longer than this (after normalization) cause the document
/// to be rejected. Inherited from the source system; kept configurable
/// per Design Notes (§9).
pub const DEFAULT_MAX_SHARD_VALUE_LEN: usize = 32;

/// Partition size for extract/reject files (§6).
pub const DEFAULT_RECORDS_PER_PART: usize = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub write_disposition: WriteDisposition,
    pub process_array: ProcessArrayPolicy,
    /// Dotted path used to shard the root fragment, e.g. `"tenant_id"`.
    pub shard_key: Option<String>,
    pub policies: Vec<FieldPolicy>,
    pub records_per_part: usize,
    /// Selects the simple (sequential fold) vs distributed (rayon fan-out)
    /// orchestration path. Both must produce identical output (§4.7).
    pub use_distributed: bool,
    /// Bounds the observer/shredder walk depth to guard against pathological
    /// nesting (§9).
    pub max_depth: usize,
    pub max_shard_value_len: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            write_disposition: WriteDisposition::default(),
            process_array: ProcessArrayPolicy::default(),
            shard_key: None,
            policies: Vec::new(),
            records_per_part: DEFAULT_RECORDS_PER_PART,
            use_distributed: false,
            max_depth: 128,
            max_shard_value_len: DEFAULT_MAX_SHARD_VALUE_LEN,
        }
    }
}

impl RunConfig {
    pub fn policy_for(&self, path: &str) -> Option<&FieldPolicy> {
        self.policies.iter().find(|p| p.path == path)
    }
}
