use std::sync::{Arc, Mutex};

use embedsql_core::{
    CatalogHandle, Database, IndexBuildSession, IndexInfo, IndexSpec, PlanError, PlanResult, ProcessRow, Table,
    TableStatusRow,
};
use embedsql_helpers::IndexMap;
use smol_str::SmolStr;
use tokio::runtime::Handle;

use crate::error::CatalogError;
use crate::function_registry::FunctionRegistry;
use crate::index_registry::IndexRegistry;
use crate::process_list::ProcessList;

/// The engine's single source of truth for what databases, tables, indexes
/// and functions exist, plus the live process registry. One `Catalog` is
/// shared (behind an `Arc`) by every session; the analyzer's assign-catalog
/// rule hands a clone of that `Arc` to every DDL/introspection plan node.
pub struct Catalog {
    databases: Mutex<IndexMap<SmolStr, Arc<dyn Database>>>,
    current_database: Mutex<SmolStr>,
    functions: FunctionRegistry,
    indexes: IndexRegistry,
    processes: ProcessList,
    locked: Mutex<bool>,
    /// Whether `database()`/`use_database()` match names exactly or fold
    /// case. MySQL's own default depends on the host platform; embedsql
    /// defaults to case-insensitive, toggled by `EngineConfig`.
    pub case_sensitive: bool,
}

impl Catalog {
    pub fn new(runtime: Handle) -> Self {
        Catalog {
            databases: Mutex::new(IndexMap::default()),
            current_database: Mutex::new(SmolStr::default()),
            functions: FunctionRegistry::new(),
            indexes: IndexRegistry::new(runtime),
            processes: ProcessList::new(),
            locked: Mutex::new(false),
            case_sensitive: false,
        }
    }

    fn name_matches(&self, lhs: &str, rhs: &str) -> bool {
        if self.case_sensitive {
            lhs == rhs
        } else {
            lhs.eq_ignore_ascii_case(rhs)
        }
    }

    pub fn add_database(&self, database: Arc<dyn Database>) {
        let name: SmolStr = database.name().into();
        let mut current = self.current_database.lock().unwrap();
        if current.is_empty() {
            *current = name.clone();
        }
        self.databases.lock().unwrap().insert(name, database);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn process_list(&self) -> &ProcessList {
        &self.processes
    }
}

impl CatalogHandle for Catalog {
    fn current_database(&self) -> SmolStr {
        self.current_database.lock().unwrap().clone()
    }

    fn database(&self, name: &str) -> PlanResult<Arc<dyn Database>> {
        self.databases
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| self.name_matches(n, name))
            .map(|(_, d)| d.clone())
            .ok_or_else(|| PlanError::DatabaseNotFound(name.into()))
    }

    fn databases(&self) -> Vec<SmolStr> {
        self.databases.lock().unwrap().keys().cloned().collect()
    }

    fn use_database(&self, name: &str) -> PlanResult<()> {
        self.database(name)?;
        *self.current_database.lock().unwrap() = name.into();
        Ok(())
    }

    fn show_create_table(&self, database: &str, table: &str) -> PlanResult<SmolStr> {
        let db = self.database(database)?;
        let table = db
            .table(table)
            .ok_or_else(|| PlanError::TableNotFound(table.into()))?;
        let columns = table
            .schema()
            .iter()
            .map(|c| format!("  `{}` {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(",\n");
        Ok(format!("CREATE TABLE `{}` (\n{}\n)", table.name(), columns).into())
    }

    fn show_table_status(&self, database: &str) -> PlanResult<Vec<TableStatusRow>> {
        let db = self.database(database)?;
        Ok(db
            .tables()
            .iter()
            .map(|(name, table)| TableStatusRow {
                name: name.clone(),
                rows: table.partition_count(&dummy_context()),
            })
            .collect())
    }

    fn show_indexes(&self, _database: &str, table: &str) -> PlanResult<Vec<IndexInfo>> {
        Ok(self.indexes.show_indexes(table))
    }

    fn create_index(&self, spec: IndexSpec) -> PlanResult<Arc<dyn IndexBuildSession>> {
        self.indexes
            .add_index(spec)
            .map_err(catalog_error_to_plan_error)
    }

    fn drop_index(&self, _database: &str, name: &str) -> PlanResult<()> {
        self.indexes.drop_index(name).map_err(catalog_error_to_plan_error)
    }

    fn lock_tables(&self, _tables: &[SmolStr]) -> PlanResult<()> {
        *self.locked.lock().unwrap() = true;
        Ok(())
    }

    fn unlock_tables(&self) -> PlanResult<()> {
        *self.locked.lock().unwrap() = false;
        Ok(())
    }

    fn process_snapshot(&self) -> Vec<ProcessRow> {
        self.processes.snapshot()
    }

    fn mark_process_done(&self, pid: u64) {
        self.processes.done(pid);
    }

    fn add_progress_item(&self, pid: u64, resource: &str, total: Option<i64>) {
        self.processes.add_progress_item(pid, resource, total);
    }

    fn update_progress(&self, pid: u64, resource: &str, delta: i64) {
        self.processes.update_progress(pid, resource, delta);
    }
}

fn catalog_error_to_plan_error(err: CatalogError) -> PlanError {
    match err {
        CatalogError::DatabaseNotFound(name) => PlanError::DatabaseNotFound(name),
        CatalogError::TableNotFound(_, name) => PlanError::TableNotFound(name),
        CatalogError::IndexNotFound(name) | CatalogError::IndexExists(name) => {
            PlanError::UnsupportedFeature(name)
        }
        CatalogError::FunctionNotFound(name) => PlanError::FunctionNotFound(name),
        other => PlanError::UnsupportedFeature(other.to_string().into()),
    }
}

fn dummy_context() -> embedsql_core::Context {
    embedsql_core::Context::new(
        Arc::new(embedsql_core::Session::new("", "", "", 0)),
        Arc::new(embedsql_core::MemoryManager::new(u64::MAX)),
        0,
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_table::{MemoryDatabase, MemoryTable};
    use embedsql_core::{Column, DataType, Schema};

    fn catalog() -> (tokio::runtime::Runtime, Catalog) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let catalog = Catalog::new(rt.handle().clone());
        (rt, catalog)
    }

    #[test]
    fn use_database_switches_current() {
        let (_rt, catalog) = catalog();
        let db = Arc::new(MemoryDatabase::new("analytics"));
        catalog.add_database(db);
        catalog.use_database("analytics").unwrap();
        assert_eq!(catalog.current_database(), "analytics");
    }

    #[test]
    fn show_create_table_renders_columns() {
        let (_rt, catalog) = catalog();
        let db = Arc::new(MemoryDatabase::new("db"));
        db.add_table(Arc::new(MemoryTable::new(
            "users",
            Schema::new(vec![Column::new("id", DataType::Int, false)]),
        )));
        catalog.add_database(db);
        let ddl = catalog.show_create_table("db", "users").unwrap();
        assert!(ddl.contains("`id` int"));
    }

    #[test]
    fn unknown_database_errors() {
        let (_rt, catalog) = catalog();
        assert!(catalog.database("missing").is_err());
    }
}
