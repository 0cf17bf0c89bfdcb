use std::sync::Arc;

use embedsql_helpers::IndexMap;
use smol_str::SmolStr;

use crate::context::Context;
use crate::error::PlanResult;
use crate::schema::Schema;
use crate::value::Row;

/// An opaque handle to one slice of a table's data. Storage engines decide
/// what goes inside; the core only ever compares and forwards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition(pub Vec<u8>);

/// A pull-based source of rows. Every executable plan node is, at the
/// bottom, backed by one of these; `RowIter::next` returning `None` signals
/// end of stream, after which `close` runs exactly once.
pub trait RowIter: Send {
    fn next(&mut self) -> PlanResult<Option<Row>>;
    fn close(&mut self) -> PlanResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn RowIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<RowIter>")
    }
}

/// A source of rows exposed by storage engines. A resolved table in the plan
/// tree carries one of these behind an `Arc`; partitioning lets an engine
/// express intra-table parallelism without the core caring how.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> &Schema;
    fn partitions(&self, ctx: &Context) -> PlanResult<Box<dyn Iterator<Item = Partition> + Send>>;
    fn partition_rows(&self, ctx: &Context, partition: &Partition) -> PlanResult<Box<dyn RowIter>>;

    /// A cheap, possibly approximate row count used to annotate `SHOW TABLE
    /// STATUS`; `None` when the engine can't answer without a scan.
    fn partition_count(&self, _ctx: &Context) -> Option<i64> {
        None
    }

    /// Exposes the index-driver surface when this table supports it.
    /// `CREATE INDEX`'s executor uses this to walk the table while
    /// building an index; tables that don't support indexing return `None`.
    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        None
    }

    /// True once a table has already been wrapped for process-list progress
    /// tracking. Lets the analyzer's table walk skip a table it (or a prior
    /// analysis pass over the same resolved plan) already wrapped, instead
    /// of nesting wrappers or double-counting progress.
    fn is_process_tracked(&self) -> bool {
        false
    }
}

/// A single key/value pair produced by an index driver while it walks a
/// table to build or verify an index.
pub struct IndexKeyValue {
    pub key: Vec<u8>,
    pub values: Row,
}

/// A table that also knows how to stream index key/value pairs and how to
/// wrap itself with a driver-supplied lookup. `CREATE INDEX`'s background
/// build and a pushed-down index scan both go through this surface.
pub trait IndexableTable: Table {
    fn index_key_values(
        &self,
        ctx: &Context,
        expressions: &[SmolStr],
    ) -> PlanResult<Box<dyn Iterator<Item = PlanResult<IndexKeyValue>> + Send>>;

    fn with_index_lookup(&self, lookup: Vec<u8>) -> Arc<dyn Table>;
}

/// A named collection of tables. The catalog owns a map of these, one per
/// database; the `USE` and table-resolution rules read it through this
/// surface rather than the concrete catalog type.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;
    fn tables(&self) -> IndexMap<SmolStr, Arc<dyn Table>>;

    fn table(&self, name: &str) -> Option<Arc<dyn Table>> {
        self.tables()
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| t.clone())
    }
}
