//! Schema Store (§4.4): the persistent {path → (type, mode, forced?)} mapping
//! plus the cumulative fragment and shard sets.
//!
//! [`SchemaStore`] is a trait so a real deployment can back it with a remote
//! document collection (mirroring the original system's use of a MongoDB
//! collection as the schema store, see DESIGN.md); [`InMemorySchemaStore`] is
//! the in-process reference implementation used by tests and the demo CLI.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::schema::{SchemaEntry, TypeMode};
use crate::{Error, Result};

/// Persistent mapping from path to resolved type, plus the cumulative
/// fragment/shard sets observed across runs (§3, §4.4).
///
/// Concurrency contract: `upsert_field`/`force_field` must be linearizable
/// per path; `add_fragment`/`add_shard` must be idempotent set-union
/// operations safe to call from many shredder workers at once (§5).
pub trait SchemaStore: Send + Sync {
    fn get_field(&self, path: &str) -> Result<Option<SchemaEntry>>;
    fn upsert_field(&self, path: &str, type_mode: TypeMode) -> Result<()>;
    fn force_field(&self, path: &str, type_mode: TypeMode) -> Result<()>;
    fn all_fields(&self) -> Result<Vec<SchemaEntry>>;

    fn add_fragment(&self, id: &str) -> Result<()>;
    fn list_fragments(&self) -> Result<Vec<String>>;

    fn add_shard(&self, value: &str) -> Result<()>;
    fn list_shards(&self) -> Result<Vec<String>>;

    /// Drops every field/fragment/shard entry. Used when `write_disposition`
    /// is `overwrite` (§4.4, §6).
    fn reset(&self) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    fields: ordermap::OrderMap<String, SchemaEntry>,
    fragments: BTreeSet<String>,
    shards: BTreeSet<String>,
}

/// `RwLock`-guarded in-process `SchemaStore`. Satisfies the same
/// linearizability contract a remote store would: each method takes the lock
/// for the duration of its single read-modify-write.
#[derive(Default)]
pub struct InMemorySchemaStore {
    inner: RwLock<Inner>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::Store("schema store lock poisoned".into()))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::Store("schema store lock poisoned".into()))
    }
}

impl SchemaStore for InMemorySchemaStore {
    fn get_field(&self, path: &str) -> Result<Option<SchemaEntry>> {
        Ok(self.read_lock()?.fields.get(path).cloned())
    }

    fn upsert_field(&self, path: &str, type_mode: TypeMode) -> Result<()> {
        let mut inner = self.write_lock()?;
        match inner.fields.get(path) {
            Some(existing) if existing.forced => {}
            Some(existing) if existing.type_mode == type_mode => {}
            _ => {
                inner.fields.insert(
                    path.to_string(),
                    SchemaEntry {
                        path: path.to_string(),
                        type_mode,
                        forced: false,
                    },
                );
            }
        }
        Ok(())
    }

    fn force_field(&self, path: &str, type_mode: TypeMode) -> Result<()> {
        let mut inner = self.write_lock()?;
        inner.fields.insert(
            path.to_string(),
            SchemaEntry {
                path: path.to_string(),
                type_mode,
                forced: true,
            },
        );
        Ok(())
    }

    fn all_fields(&self) -> Result<Vec<SchemaEntry>> {
        Ok(self.read_lock()?.fields.values().cloned().collect())
    }

    fn add_fragment(&self, id: &str) -> Result<()> {
        self.write_lock()?.fragments.insert(id.to_string());
        Ok(())
    }

    fn list_fragments(&self) -> Result<Vec<String>> {
        Ok(self.read_lock()?.fragments.iter().cloned().collect())
    }

    fn add_shard(&self, value: &str) -> Result<()> {
        self.write_lock()?.shards.insert(value.to_string());
        Ok(())
    }

    fn list_shards(&self) -> Result<Vec<String>> {
        Ok(self.read_lock()?.shards.iter().cloned().collect())
    }

    fn reset(&self) -> Result<()> {
        let mut inner = self.write_lock()?;
        inner.fields.clear();
        inner.fragments.clear();
        inner.shards.clear();
        Ok(())
    }
}
