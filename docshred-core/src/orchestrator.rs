//! Orchestrator (§4.7): drives extract → observe → reduce → shred →
//! materialize → load in order, holding the run's [`RunConfig`] and
//! aggregating a [`RunSummary`].
//!
//! `RunConfig.use_distributed` selects between a sequential fold (`simple`)
//! and a Rayon `par_iter` fan-out (`distributed`) across the same
//! per-document `observe_document`/`shred_document` calls (§4.7, §10.7); both
//! paths are required to produce the same Schema and fragment set, which the
//! commutative/associative widening lattice makes safe regardless of the
//! order observations arrive at the reducer.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;

use crate::config::{RunConfig, WriteDisposition};
use crate::error::with_retry;
use crate::observer::observe_document;
use crate::reducer::reduce_one;
use crate::schema::{self, ResolvedSchema};
use crate::shredder::{shred_document, FragmentMap, Row};
use crate::source::DocumentSource;
use crate::storage::Storage;
use crate::store::SchemaStore;
use crate::warehouse::{self, WarehouseDriver};
use crate::Result;

/// Everything printed/returned on a successful run (§6 "Exit behavior").
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records_extracted: usize,
    pub records_rejected: usize,
    pub sort_key_min: Option<String>,
    pub sort_key_max: Option<String>,
    pub output_files: Vec<PathBuf>,
    pub destination_tables: Vec<String>,
}

/// Wires the Schema Store, Storage, and Warehouse Driver collaborators
/// together and drives one run (§4.7).
pub struct Orchestrator<'a> {
    pub config: RunConfig,
    pub store: &'a dyn SchemaStore,
    pub storage: &'a dyn Storage,
    pub warehouse: &'a dyn WarehouseDriver,
}

fn table_name_for_fragment(base: &str, fragment_id: &str) -> String {
    if fragment_id == "root" || fragment_id.starts_with("root/") {
        base.to_string()
    } else {
        format!("{base}_{}", fragment_id.replace('.', "_"))
    }
}

fn write_line_parts(dir: &Path, lines: &[String], records_per_part: usize) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    for (i, chunk) in lines.chunks(records_per_part.max(1)).enumerate() {
        let mut file = fs::File::create(dir.join(i.to_string()))?;
        for line in chunk {
            writeln!(file, "{line}")?;
        }
    }
    Ok(())
}

fn write_rows(path: &Path, rows: &[Row]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    for row in rows {
        let obj: serde_json::Map<String, Value> =
            row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        writeln!(file, "{}", Value::Object(obj))?;
    }
    Ok(())
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: RunConfig,
        store: &'a dyn SchemaStore,
        storage: &'a dyn Storage,
        warehouse: &'a dyn WarehouseDriver,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            warehouse,
        }
    }

    /// Applies `RunConfig.policies` entries that carry a `data_type`
    /// override as forced schema entries (§6 "policies[]", §4.3 "Forced
    /// override"). Run once, before any observation is folded.
    fn apply_forced_policies(&self) -> Result<()> {
        for policy in &self.config.policies {
            if let Some(data_type) = policy.data_type {
                let mode = policy.mode.unwrap_or(crate::schema::Mode::Nullable);
                self.store
                    .force_field(&policy.path, crate::schema::TypeMode::new(data_type, mode))?;
            }
        }
        Ok(())
    }

    /// Runs one complete extract→load cycle over `source`, writing staged
    /// files under `run_dir/<collection>/...` (§6 "On-disk layout") and
    /// loading into `db`/`collection`-prefixed tables.
    pub fn run(
        &self,
        source: &dyn DocumentSource,
        run_dir: &Path,
        collection: &str,
        db: &str,
    ) -> Result<RunSummary> {
        if self.config.write_disposition == WriteDisposition::Overwrite {
            self.store.reset()?;
        }
        self.apply_forced_policies()?;

        let collection_dir = run_dir.join(collection);
        let data_dir = collection_dir.join("data");
        let reject_dir = collection_dir.join("rejected");
        self.storage.mkdir(&data_dir)?;
        self.storage.mkdir(&reject_dir)?;

        let records = source.iterate()?;
        write_line_parts(
            &data_dir,
            &records.iter().map(|r| r.raw.clone()).collect::<Vec<_>>(),
            self.config.records_per_part,
        )?;

        let mut parsed: Vec<Value> = Vec::with_capacity(records.len());
        let mut reject_lines: Vec<String> = Vec::new();
        let mut sort_key_min: Option<String> = None;
        let mut sort_key_max: Option<String> = None;
        let mut records_rejected = 0usize;

        for record in &records {
            match serde_json::from_str::<Value>(&record.raw) {
                Ok(doc) => {
                    if let Some(key) = &record.sort_key {
                        sort_key_min = Some(match sort_key_min {
                            Some(m) if m <= *key => m,
                            _ => key.clone(),
                        });
                        sort_key_max = Some(match sort_key_max {
                            Some(m) if m >= *key => m,
                            _ => key.clone(),
                        });
                    }
                    parsed.push(doc);
                }
                Err(e) => {
                    records_rejected += 1;
                    reject_lines.push(format!("JSON parse error: {e} | {}", record.raw));
                    tracing::warn!(error = %e, "rejecting document with a JSON parse error");
                }
            }
        }

        let observation_batches: Vec<_> = if self.config.use_distributed {
            parsed
                .par_iter()
                .map(|doc| observe_document(doc, self.config.max_depth))
                .collect()
        } else {
            parsed
                .iter()
                .map(|doc| observe_document(doc, self.config.max_depth))
                .collect()
        };
        for observation in observation_batches.into_iter().flatten() {
            reduce_one(self.store, &observation.path, observation.type_mode)?;
        }

        let resolved_schema: ResolvedSchema = schema::snapshot(self.store)?;

        let shred_results: Vec<_> = if self.config.use_distributed {
            parsed
                .par_iter()
                .map(|doc| shred_document(doc, &resolved_schema, &self.config))
                .collect()
        } else {
            parsed
                .iter()
                .map(|doc| shred_document(doc, &resolved_schema, &self.config))
                .collect()
        };

        let mut fragment_map: FragmentMap = FragmentMap::new();
        for result in shred_results {
            match result {
                Ok(outcome) => {
                    for fragment_id in outcome.fragments.keys() {
                        self.store.add_fragment(fragment_id)?;
                    }
                    if let Some(shard_value) = &outcome.shard_value {
                        self.store.add_shard(shard_value)?;
                    }
                    for (fragment_id, rows) in outcome.fragments {
                        fragment_map.entry(fragment_id).or_default().extend(rows);
                    }
                }
                Err(reason) => {
                    records_rejected += 1;
                    reject_lines.push(reason.to_string());
                    tracing::warn!(reason = %reason, "rejecting document during shredding");
                }
            }
        }
        write_line_parts(&reject_dir, &reject_lines, self.config.records_per_part)?;

        let transform_dir = collection_dir.join("data_transform").join("output");
        let mut output_files = Vec::with_capacity(fragment_map.len());
        for (fragment_id, rows) in &fragment_map {
            let fragment_dir = transform_dir.join(fragment_id);
            self.storage.mkdir(&fragment_dir)?;
            let part_path = fragment_dir.join("0");
            write_rows(&part_path, rows)?;
            output_files.push(part_path);
        }

        let destination_tables = match self.config.write_disposition {
            WriteDisposition::Overwrite => {
                with_retry("warehouse.dataset_create", || self.warehouse.dataset_create(db))?;
                let existing_tables = with_retry("warehouse.list_tables", || {
                    self.warehouse.list_tables(db, collection)
                })?;
                for table in &existing_tables {
                    with_retry("warehouse.drop_table", || self.warehouse.drop_table(db, table))?;
                }
                warehouse::create_tables(self.warehouse, db, collection, &resolved_schema)?
            }
            WriteDisposition::Append => {
                warehouse::evolve_tables(self.warehouse, db, collection, &resolved_schema)?
            }
        };

        for fragment_id in fragment_map.keys() {
            let table_name = table_name_for_fragment(collection, fragment_id);
            let file_glob = transform_dir.join(fragment_id).join("0");
            with_retry("warehouse.load_table", || {
                self.warehouse
                    .load_table(db, &table_name, &file_glob.to_string_lossy())
            })?;
        }

        Ok(RunSummary {
            records_extracted: parsed.len(),
            records_rejected,
            sort_key_min,
            sort_key_max,
            output_files,
            destination_tables,
        })
    }
}
