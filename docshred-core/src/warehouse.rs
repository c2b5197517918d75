//! Warehouse Schema Materializer (§4.6): translates the resolved logical
//! Schema into physical tables, and diffs against existing tables on reruns.
//!
//! The type map and DDL dialect live behind the [`WarehouseDriver`] trait so
//! a real deployment can target BigQuery/Hive/etc; [`LocalWarehouseDriver`]
//! is an in-memory reference implementation that records the DDL/DML it
//! would have issued, sufficient to unit-test the evolution logic without a
//! live connection.

use std::sync::RwLock;

use ordermap::OrderMap;

use crate::error::with_retry;
use crate::schema::{BaseType, ResolvedSchema};
use crate::{Error, Result};

/// One physical column: its name and the driver-specific type string the
/// logical→physical [`physical_type`] map produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub physical_type: String,
}

/// External warehouse operations the Materializer drives (§6 "Warehouse
/// driver interface"). A real implementation talks to BigQuery/Hive/etc; it
/// is expected to be idempotent and to surface transient failures as
/// [`Error::Warehouse`] so [`with_retry`] can retry them.
pub trait WarehouseDriver: Send + Sync {
    fn dataset_create(&self, name: &str) -> Result<()>;
    fn dataset_delete(&self, name: &str) -> Result<()>;
    fn table_exists(&self, db: &str, name: &str) -> Result<bool>;
    fn create_table(&self, db: &str, name: &str, columns: &[ColumnDef]) -> Result<Vec<String>>;
    fn describe_table(&self, db: &str, name: &str) -> Result<Vec<ColumnDef>>;
    fn list_tables(&self, db: &str, prefix: &str) -> Result<Vec<String>>;
    fn alter_table_add_column(&self, db: &str, name: &str, col: &ColumnDef) -> Result<()>;
    fn alter_table_change_type(&self, db: &str, name: &str, col: &ColumnDef) -> Result<()>;
    fn load_table(&self, db: &str, name: &str, file_glob: &str) -> Result<()>;
    fn drop_table(&self, db: &str, name: &str) -> Result<()>;
}

/// Maps a logical [`BaseType`] to a physical column type string (§4.6
/// "pluggable type map"). `Record` never reaches this function — record
/// entries emit no column of their own.
pub fn physical_type(base_type: BaseType) -> &'static str {
    match base_type {
        BaseType::String => "string",
        BaseType::Integer => "bigint",
        BaseType::Float => "double",
        BaseType::Boolean => "boolean",
        BaseType::Record => unreachable!("record entries emit no column"),
    }
}

fn type_rank(physical: &str) -> u8 {
    match physical {
        "boolean" => 0,
        "bigint" | "int" => 1,
        "double" => 2,
        _ => 3, // string/varchar and anything unrecognized sort widest
    }
}

/// `<base>_<path with '.' replaced by '_'>` (§4.6 "target a child table
/// named `<base>_<normalized_path>`").
fn child_table_name(base: &str, path: &str) -> String {
    format!("{base}_{}", path.replace('.', "_"))
}

/// The child table a nested (dotted) path's column belongs to: the nearest
/// enclosing repeated-record path, which is always the prefix before the
/// rightmost `.` (array-joins only ever occur at a repeated-record boundary,
/// §3 "Path").
fn owning_table_for_nested_path(base: &str, path: &str) -> String {
    let ancestor = path.rsplit_once('.').map(|(prefix, _)| prefix).unwrap_or(path);
    child_table_name(base, ancestor)
}

/// Plans the full set of tables and columns the resolved Schema implies,
/// per the "Create path" rules of §4.6, without regard to what already
/// exists physically. Shared by both the create and evolve paths.
pub fn plan_tables(base: &str, schema: &ResolvedSchema) -> OrderMap<String, Vec<ColumnDef>> {
    let mut tables: OrderMap<String, Vec<ColumnDef>> = OrderMap::new();
    tables.entry(base.to_string()).or_default();

    for entry in schema.values() {
        if entry.type_mode.base_type == BaseType::Record {
            if entry.type_mode.mode == crate::schema::Mode::Repeated {
                tables.entry(child_table_name(base, &entry.path)).or_default();
            }
            continue;
        }

        let (table, column_name) = if entry.type_mode.mode == crate::schema::Mode::Repeated {
            (child_table_name(base, &entry.path), "value".to_string())
        } else if entry.path.contains('.') {
            (
                owning_table_for_nested_path(base, &entry.path),
                crate::path::suffix_after_last_array_join(&entry.path).to_string(),
            )
        } else {
            (base.to_string(), entry.path.clone())
        };

        tables.entry(table).or_default().push(ColumnDef {
            name: column_name,
            physical_type: physical_type(entry.type_mode.base_type).to_string(),
        });
    }

    for (name, columns) in tables.iter_mut() {
        if name == base {
            columns.push(ColumnDef {
                name: "hash_code".to_string(),
                physical_type: "string".to_string(),
            });
        } else {
            columns.push(ColumnDef {
                name: "parent_hash_code".to_string(),
                physical_type: "string".to_string(),
            });
            columns.push(ColumnDef {
                name: "hash_code".to_string(),
                physical_type: "string".to_string(),
            });
        }
    }

    tables
}

/// Creates every table the plan implies, used when no table exists yet or
/// `write_disposition=overwrite` (§4.6 "Create path"). Returns the created
/// table names.
pub fn create_tables(
    driver: &dyn WarehouseDriver,
    db: &str,
    base: &str,
    schema: &ResolvedSchema,
) -> Result<Vec<String>> {
    let plan = plan_tables(base, schema);
    let mut created = Vec::with_capacity(plan.len());
    for (name, columns) in &plan {
        with_retry("warehouse.create_table", || driver.create_table(db, name, columns))?;
        created.push(name.clone());
    }
    Ok(created)
}

/// Diffs the plan against the tables' current physical columns and emits
/// `ADD COLUMN`/`CHANGE TYPE`/`CREATE TABLE` in that order to minimize
/// locking windows (§4.6 "Evolve path"). Type-narrowing transitions are a
/// documented no-op (§9).
pub fn evolve_tables(
    driver: &dyn WarehouseDriver,
    db: &str,
    base: &str,
    schema: &ResolvedSchema,
) -> Result<Vec<String>> {
    let plan = plan_tables(base, schema);

    let mut modify_ops: Vec<(String, ColumnDef)> = Vec::new();
    let mut add_ops: Vec<(String, ColumnDef)> = Vec::new();
    let mut create_ops: Vec<(String, Vec<ColumnDef>)> = Vec::new();

    for (table, columns) in &plan {
        let exists = with_retry("warehouse.table_exists", || driver.table_exists(db, table))?;
        if !exists {
            create_ops.push((table.clone(), columns.clone()));
            continue;
        }
        let existing = with_retry("warehouse.describe_table", || driver.describe_table(db, table))?;
        let existing_types: std::collections::HashMap<&str, &str> = existing
            .iter()
            .map(|c| (c.name.as_str(), c.physical_type.as_str()))
            .collect();

        for col in columns {
            match existing_types.get(col.name.as_str()) {
                None => add_ops.push((table.clone(), col.clone())),
                Some(existing_type) if type_rank(existing_type) < type_rank(col.physical_type.as_str()) => {
                    modify_ops.push((table.clone(), col.clone()));
                }
                _ => {}
            }
        }
    }

    for (table, col) in &modify_ops {
        with_retry("warehouse.alter_table_change_type", || {
            driver.alter_table_change_type(db, table, col)
        })?;
    }
    for (table, col) in &add_ops {
        with_retry("warehouse.alter_table_add_column", || {
            driver.alter_table_add_column(db, table, col)
        })?;
    }
    let mut created = Vec::with_capacity(create_ops.len());
    for (table, columns) in &create_ops {
        with_retry("warehouse.create_table", || driver.create_table(db, table, columns))?;
        created.push(table.clone());
    }
    Ok(created)
}

#[derive(Default)]
struct LocalWarehouseState {
    datasets: std::collections::BTreeSet<String>,
    tables: OrderMap<(String, String), Vec<ColumnDef>>,
    ddl_log: Vec<String>,
    loads: Vec<(String, String, String)>,
}

/// Keeps tables/columns entirely in memory and records every DDL/DML
/// statement it would have issued (§10.6 reference driver). Sufficient to
/// exercise `create_tables`/`evolve_tables` without a live warehouse.
#[derive(Default)]
pub struct LocalWarehouseDriver {
    state: RwLock<LocalWarehouseState>,
}

impl LocalWarehouseDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, LocalWarehouseState>> {
        self.state
            .write()
            .map_err(|_| Error::Warehouse("local warehouse state lock poisoned".into()))
    }

    /// The DDL/DML strings issued so far, in order. Useful for assertions in
    /// tests that want to check ordering (`modify → add → create`, §4.6).
    pub fn ddl_log(&self) -> Vec<String> {
        self.lock().map(|s| s.ddl_log.clone()).unwrap_or_default()
    }

    pub fn loads(&self) -> Vec<(String, String, String)> {
        self.lock().map(|s| s.loads.clone()).unwrap_or_default()
    }
}

impl WarehouseDriver for LocalWarehouseDriver {
    fn dataset_create(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!("CREATE SCHEMA {name}"));
        state.datasets.insert(name.to_string());
        Ok(())
    }

    fn dataset_delete(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!("DROP SCHEMA {name}"));
        state.datasets.remove(name);
        Ok(())
    }

    fn table_exists(&self, db: &str, name: &str) -> Result<bool> {
        Ok(self.lock()?.tables.contains_key(&(db.to_string(), name.to_string())))
    }

    fn create_table(&self, db: &str, name: &str, columns: &[ColumnDef]) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        let col_list = columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.physical_type))
            .collect::<Vec<_>>()
            .join(", ");
        state
            .ddl_log
            .push(format!("CREATE TABLE {db}.{name} ({col_list})"));
        state
            .tables
            .insert((db.to_string(), name.to_string()), columns.to_vec());
        Ok(vec![name.to_string()])
    }

    fn describe_table(&self, db: &str, name: &str) -> Result<Vec<ColumnDef>> {
        Ok(self
            .lock()?
            .tables
            .get(&(db.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn list_tables(&self, db: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .tables
            .keys()
            .filter(|(d, name)| d == db && name.starts_with(prefix))
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn alter_table_add_column(&self, db: &str, name: &str, col: &ColumnDef) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!(
            "ALTER TABLE {db}.{name} ADD COLUMN {} {}",
            col.name, col.physical_type
        ));
        state
            .tables
            .entry((db.to_string(), name.to_string()))
            .or_default()
            .push(col.clone());
        Ok(())
    }

    fn alter_table_change_type(&self, db: &str, name: &str, col: &ColumnDef) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!(
            "ALTER TABLE {db}.{name} CHANGE {} {}",
            col.name, col.physical_type
        ));
        if let Some(cols) = state.tables.get_mut(&(db.to_string(), name.to_string())) {
            if let Some(existing) = cols.iter_mut().find(|c| c.name == col.name) {
                existing.physical_type = col.physical_type.clone();
            }
        }
        Ok(())
    }

    fn load_table(&self, db: &str, name: &str, file_glob: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!("LOAD DATA INPATH '{file_glob}' INTO TABLE {db}.{name}"));
        state
            .loads
            .push((db.to_string(), name.to_string(), file_glob.to_string()));
        Ok(())
    }

    fn drop_table(&self, db: &str, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.ddl_log.push(format!("DROP TABLE {db}.{name}"));
        state.tables.remove(&(db.to_string(), name.to_string()));
        Ok(())
    }
}
