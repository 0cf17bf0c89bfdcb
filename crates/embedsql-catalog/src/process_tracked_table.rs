use std::sync::Arc;

use embedsql_core::{Context, IndexKeyValue, IndexableTable, Partition, PlanResult, Row, RowIter, Schema, Table};
use smol_str::SmolStr;

use crate::catalog::Catalog;

/// Wraps a resolved table so every partition scan (and, for indexable
/// tables, every index-key-value scan) reports its progress to the
/// catalog's process list under one pid/resource pair. The analyzer's
/// table-tracking rule applies this to each distinct `ResolvedTable` it
/// finds in a plan, exactly once per pid.
pub struct ProcessTrackedTable {
    inner: Arc<dyn Table>,
    catalog: Arc<Catalog>,
    pid: u64,
    resource: SmolStr,
}

impl ProcessTrackedTable {
    pub fn new(inner: Arc<dyn Table>, catalog: Arc<Catalog>, pid: u64, resource: impl Into<SmolStr>) -> Self {
        ProcessTrackedTable {
            inner,
            catalog,
            pid,
            resource: resource.into(),
        }
    }
}

impl Table for ProcessTrackedTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn partitions(&self, ctx: &Context) -> PlanResult<Box<dyn Iterator<Item = Partition> + Send>> {
        self.inner.partitions(ctx)
    }

    fn partition_rows(&self, ctx: &Context, partition: &Partition) -> PlanResult<Box<dyn RowIter>> {
        let inner = self.inner.partition_rows(ctx, partition)?;
        Ok(Box::new(TrackedRowIter {
            inner,
            catalog: self.catalog.clone(),
            pid: self.pid,
            resource: self.resource.clone(),
            notified: false,
        }))
    }

    fn partition_count(&self, ctx: &Context) -> Option<i64> {
        self.inner.partition_count(ctx)
    }

    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        if self.inner.as_indexable().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn is_process_tracked(&self) -> bool {
        true
    }
}

impl IndexableTable for ProcessTrackedTable {
    fn index_key_values(
        &self,
        ctx: &Context,
        expressions: &[SmolStr],
    ) -> PlanResult<Box<dyn Iterator<Item = PlanResult<IndexKeyValue>> + Send>> {
        let inner = self
            .inner
            .as_indexable()
            .expect("as_indexable only returns Some(self) when the wrapped table is indexable")
            .index_key_values(ctx, expressions)?;
        Ok(Box::new(ProcessIndexKeyValueIter {
            inner,
            catalog: self.catalog.clone(),
            pid: self.pid,
            resource: self.resource.clone(),
            notified: false,
        }))
    }

    fn with_index_lookup(&self, lookup: Vec<u8>) -> Arc<dyn Table> {
        self.inner
            .as_indexable()
            .expect("as_indexable only returns Some(self) when the wrapped table is indexable")
            .with_index_lookup(lookup)
    }
}

/// Fires its notify exactly once, on the first `None` from the wrapped
/// iterator or on `close`, whichever comes first.
struct TrackedRowIter {
    inner: Box<dyn RowIter>,
    catalog: Arc<Catalog>,
    pid: u64,
    resource: SmolStr,
    notified: bool,
}

impl TrackedRowIter {
    fn notify(&mut self) {
        if !self.notified {
            self.catalog.process_list().update_progress(self.pid, &self.resource, 1);
            self.notified = true;
        }
    }
}

impl RowIter for TrackedRowIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        match self.inner.next()? {
            Some(row) => Ok(Some(row)),
            None => {
                self.notify();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> PlanResult<()> {
        self.notify();
        self.inner.close()
    }
}

/// Same fire-once notify as `TrackedRowIter`, over the plain iterator
/// `index_key_values` returns.
struct ProcessIndexKeyValueIter {
    inner: Box<dyn Iterator<Item = PlanResult<IndexKeyValue>> + Send>,
    catalog: Arc<Catalog>,
    pid: u64,
    resource: SmolStr,
    notified: bool,
}

impl Iterator for ProcessIndexKeyValueIter {
    type Item = PlanResult<IndexKeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => Some(item),
            None => {
                if !self.notified {
                    self.catalog.process_list().update_progress(self.pid, &self.resource, 1);
                    self.notified = true;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_table::MemoryTable;
    use embedsql_core::{Column, DataType, MemoryManager, Session, Value};

    fn ctx() -> Context {
        Context::new(
            Arc::new(Session::new("127.0.0.1:3306", "10.0.0.1:1", "root", 1)),
            Arc::new(MemoryManager::new(1 << 20)),
            1,
            "test",
        )
    }

    #[test]
    fn wrapping_reports_itself_tracked_and_forwards_rows() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let catalog = Arc::new(Catalog::new(rt.handle().clone()));
        catalog.process_list().add_process(1, 1, "root", "SELECT 1");

        let table = Arc::new(MemoryTable::new(
            "t",
            Schema::new(vec![Column::new("id", DataType::Int, false)]),
        ));
        table.insert(vec![Value::Int(1)]);
        catalog.process_list().add_progress_item(1, "t", table.partition_count(&ctx()));

        let tracked = ProcessTrackedTable::new(table, catalog.clone(), 1, "t");
        assert!(tracked.is_process_tracked());
        assert!(tracked.as_indexable().is_some());

        let ctx = ctx();
        let partition = tracked.partitions(&ctx).unwrap().next().unwrap();
        let mut rows = tracked.partition_rows(&ctx, &partition).unwrap();
        assert_eq!(rows.next().unwrap(), Some(vec![Value::Int(1)]));
        assert_eq!(rows.next().unwrap(), None);

        let snapshot = catalog.process_list().snapshot();
        assert_eq!(snapshot[0].progress, vec![("t".into(), 1.0)]);
    }
}
