use std::sync::Mutex;

use embedsql_core::{CatalogHandle, ProcessRow};
use embedsql_helpers::IndexMap;
use smol_str::SmolStr;

struct ProcessEntry {
    connection_id: u32,
    user: SmolStr,
    query: SmolStr,
    /// Resource name to (done, total) progress. `total` is `None` for
    /// resources whose size is unknown up front.
    progress: IndexMap<SmolStr, (f64, Option<f64>)>,
}

/// The catalog's live-query registry: one entry per in-flight pid, each with
/// zero or more named progress counters a long-running node (a table scan
/// backing a `CREATE INDEX`, say) can bump as it works. `SHOW PROCESSLIST`
/// reads a point-in-time snapshot of this; nothing here blocks a query.
#[derive(Default)]
pub struct ProcessList {
    processes: Mutex<IndexMap<u64, ProcessEntry>>,
}

impl ProcessList {
    pub fn new() -> Self {
        ProcessList::default()
    }

    pub fn add_process(&self, pid: u64, connection_id: u32, user: impl Into<SmolStr>, query: impl Into<SmolStr>) {
        self.processes.lock().unwrap().insert(
            pid,
            ProcessEntry {
                connection_id,
                user: user.into(),
                query: query.into(),
                progress: IndexMap::default(),
            },
        );
    }

    pub fn add_progress_item(&self, pid: u64, resource: &str, total: Option<i64>) {
        if let Some(entry) = self.processes.lock().unwrap().get_mut(&pid) {
            entry
                .progress
                .insert(resource.into(), (0.0, total.map(|t| t as f64)));
        }
    }

    pub fn update_progress(&self, pid: u64, resource: &str, delta: i64) {
        if let Some(entry) = self.processes.lock().unwrap().get_mut(&pid) {
            if let Some((done, _)) = entry.progress.get_mut(resource) {
                *done += delta as f64;
            }
        }
    }

    /// Removes the process. Called once the query's root iterator (or, for
    /// `CREATE INDEX`, the background build) finishes.
    pub fn done(&self, pid: u64) {
        self.processes.lock().unwrap().shift_remove(&pid);
    }

    pub fn snapshot(&self) -> Vec<ProcessRow> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, entry)| ProcessRow {
                pid: *pid,
                connection_id: entry.connection_id,
                user: entry.user.clone(),
                query: entry.query.clone(),
                progress: entry
                    .progress
                    .iter()
                    .map(|(name, (done, total))| {
                        let fraction = match total {
                            Some(total) if *total > 0.0 => done / total,
                            _ => 0.0,
                        };
                        (name.clone(), fraction)
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Blanket helper so a `CatalogHandle` can delegate process-tracking calls
/// straight to its `ProcessList` field.
pub trait ProcessTrackingHandle: CatalogHandle {
    fn process_list(&self) -> &ProcessList;
}
