use std::sync::{Arc, Mutex};

use embedsql_core::{IndexBuildSession, IndexInfo, IndexSpec};
use embedsql_helpers::IndexMap;
use smol_str::SmolStr;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{CatalogError, CatalogResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexState {
    Pending,
    Ready,
    Outdated,
    Released,
}

struct IndexEntry {
    spec: IndexSpec,
    state: IndexState,
}

/// Index builds go through the same pending/ready/outdated/released
/// lifecycle a background driver would use: `add_index` registers the index
/// as pending and hands back a session whose `mark_done`/`wait_ready` are the
/// caller-completed and caller-awaited signals either side of the registry
/// accepting the build. The actual driver work (walking the table into an
/// index file) is the caller's problem; this only tracks state.
pub struct IndexRegistry {
    indexes: Arc<Mutex<IndexMap<SmolStr, IndexEntry>>>,
    runtime: Handle,
}

impl IndexRegistry {
    pub fn new(runtime: Handle) -> Self {
        IndexRegistry {
            indexes: Arc::new(Mutex::new(IndexMap::default())),
            runtime,
        }
    }

    pub fn add_index(&self, spec: IndexSpec) -> CatalogResult<Arc<dyn IndexBuildSession>> {
        let mut indexes = self.indexes.lock().unwrap();
        if indexes.contains_key(&spec.name) {
            return Err(CatalogError::IndexExists(spec.name));
        }
        indexes.insert(
            spec.name.clone(),
            IndexEntry {
                spec: spec.clone(),
                state: IndexState::Pending,
            },
        );
        drop(indexes);

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let registry = self.indexes.clone();
        let name = spec.name.clone();
        self.runtime.spawn(async move {
            if done_rx.await.is_ok() {
                if let Some(entry) = registry.lock().unwrap().get_mut(&name) {
                    if entry.state == IndexState::Pending {
                        entry.state = IndexState::Ready;
                    }
                }
                let _ = ready_tx.send(());
            }
        });

        Ok(Arc::new(CallerSession {
            done_tx: Mutex::new(Some(done_tx)),
            ready_rx: Mutex::new(Some(ready_rx)),
        }))
    }

    pub fn drop_index(&self, name: &str) -> CatalogResult<()> {
        let mut indexes = self.indexes.lock().unwrap();
        let entry = indexes
            .get_mut(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.into()))?;
        entry.state = IndexState::Outdated;
        let name = SmolStr::from(name);
        let registry = self.indexes.clone();
        drop(indexes);
        // Deletion itself happens off the caller's thread; the registry
        // reflects `Outdated` immediately so lookups stop using it.
        self.runtime.spawn(async move {
            if let Some(entry) = registry.lock().unwrap().get_mut(&name) {
                entry.state = IndexState::Released;
            }
        });
        Ok(())
    }

    pub fn show_indexes(&self, table: &str) -> Vec<IndexInfo> {
        self.indexes
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.spec.table.eq_ignore_ascii_case(table) && e.state == IndexState::Ready)
            .map(|e| IndexInfo {
                name: e.spec.name.clone(),
                expressions: e.spec.expressions.clone(),
                driver: e.spec.driver.clone(),
            })
            .collect()
    }
}

struct CallerSession {
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
    ready_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl IndexBuildSession for CallerSession {
    fn mark_done(&self) {
        if let Some(tx) = self.done_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    fn wait_ready(&self) {
        if let Some(rx) = self.ready_rx.lock().unwrap().take() {
            let _ = rx.blocking_recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> IndexSpec {
        IndexSpec {
            database: "db".into(),
            table: "t".into(),
            name: name.into(),
            expressions: vec!["a".into()],
            driver: "memory".into(),
        }
    }

    #[test]
    fn build_signals_round_trip() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let registry = IndexRegistry::new(rt.handle().clone());
        let session = registry.add_index(spec("idx")).unwrap();
        session.mark_done();
        session.wait_ready();
        let indexes = registry.show_indexes("t");
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "idx");
    }

    #[test]
    fn duplicate_index_name_errors() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let registry = IndexRegistry::new(rt.handle().clone());
        registry.add_index(spec("idx")).unwrap().mark_done();
        assert!(registry.add_index(spec("idx")).is_err());
    }

    #[test]
    fn drop_index_removes_it_from_show_indexes() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let registry = IndexRegistry::new(rt.handle().clone());
        let session = registry.add_index(spec("idx")).unwrap();
        session.mark_done();
        session.wait_ready();
        registry.drop_index("idx").unwrap();
        assert!(registry.show_indexes("t").is_empty());
    }
}
