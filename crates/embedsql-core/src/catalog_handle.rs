use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::PlanResult;
use crate::storage::Database;

/// One row of `SHOW TABLE STATUS`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatusRow {
    pub name: SmolStr,
    pub rows: Option<i64>,
}

/// One row of `SHOW INDEX FROM`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: SmolStr,
    pub expressions: Vec<SmolStr>,
    pub driver: SmolStr,
}

/// One row of `SHOW PROCESSLIST`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: u64,
    pub connection_id: u32,
    pub user: SmolStr,
    pub query: SmolStr,
    pub progress: Vec<(SmolStr, f64)>,
}

/// Parameters for registering a new index build.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub database: SmolStr,
    pub table: SmolStr,
    pub name: SmolStr,
    pub expressions: Vec<SmolStr>,
    pub driver: SmolStr,
}

/// The two-signal handshake an index build goes through: the driver fires
/// `mark_done` once it has finished writing the index, then the caller calls
/// `wait_ready` to block until the registry has observed that and flipped
/// the index from pending to ready.
pub trait IndexBuildSession: Send + Sync {
    fn mark_done(&self);
    fn wait_ready(&self);
}

/// The narrow slice of catalog functionality the plan tree's DDL and
/// introspection nodes need. The concrete catalog (with its locks, function
/// registry, and process list) lives one crate up; nodes only ever see this
/// trait object, injected by the analyzer's assign-catalog rule.
pub trait CatalogHandle: Send + Sync {
    fn current_database(&self) -> SmolStr;
    fn database(&self, name: &str) -> PlanResult<Arc<dyn Database>>;
    fn databases(&self) -> Vec<SmolStr>;
    fn use_database(&self, name: &str) -> PlanResult<()>;

    fn show_create_table(&self, database: &str, table: &str) -> PlanResult<SmolStr>;
    fn show_table_status(&self, database: &str) -> PlanResult<Vec<TableStatusRow>>;
    fn show_indexes(&self, database: &str, table: &str) -> PlanResult<Vec<IndexInfo>>;

    fn create_index(&self, spec: IndexSpec) -> PlanResult<Arc<dyn IndexBuildSession>>;
    fn drop_index(&self, database: &str, name: &str) -> PlanResult<()>;

    fn lock_tables(&self, tables: &[SmolStr]) -> PlanResult<()>;
    fn unlock_tables(&self) -> PlanResult<()>;

    fn process_snapshot(&self) -> Vec<ProcessRow>;
    fn mark_process_done(&self, pid: u64);
    fn add_progress_item(&self, pid: u64, resource: &str, total: Option<i64>);
    fn update_progress(&self, pid: u64, resource: &str, delta: i64);
}
