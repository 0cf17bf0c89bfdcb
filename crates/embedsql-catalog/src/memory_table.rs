use std::sync::{Arc, Mutex};

use embedsql_core::{Context, Database, IndexKeyValue, IndexableTable, Partition, PlanResult, Row, RowIter, Schema, Table};
use embedsql_helpers::IndexMap;
use smol_str::SmolStr;

/// The simplest possible `Table`: everything lives in one in-memory vector
/// behind a single partition. Used by tests and by `embedsql`'s doctest
/// examples, not meant for production storage.
pub struct MemoryTable {
    name: SmolStr,
    schema: Schema,
    rows: Mutex<Vec<Row>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<SmolStr>, schema: Schema) -> Self {
        MemoryTable {
            name: name.into(),
            schema,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, row: Row) {
        self.rows.lock().unwrap().push(row);
    }

    pub fn insert_all(&self, rows: impl IntoIterator<Item = Row>) {
        self.rows.lock().unwrap().extend(rows);
    }
}

struct VecRowIter {
    rows: std::vec::IntoIter<Row>,
}

impl RowIter for VecRowIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn partitions(&self, _ctx: &Context) -> PlanResult<Box<dyn Iterator<Item = Partition> + Send>> {
        Ok(Box::new(std::iter::once(Partition(vec![0]))))
    }

    fn partition_rows(&self, _ctx: &Context, _partition: &Partition) -> PlanResult<Box<dyn RowIter>> {
        let rows = self.rows.lock().unwrap().clone();
        Ok(Box::new(VecRowIter {
            rows: rows.into_iter(),
        }))
    }

    fn partition_count(&self, _ctx: &Context) -> Option<i64> {
        Some(self.rows.lock().unwrap().len() as i64)
    }

    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        Some(self)
    }
}

impl IndexableTable for MemoryTable {
    fn index_key_values(
        &self,
        ctx: &Context,
        expressions: &[SmolStr],
    ) -> PlanResult<Box<dyn Iterator<Item = PlanResult<IndexKeyValue>> + Send>> {
        let indices = expressions
            .iter()
            .filter_map(|name| self.schema.resolve_column(None, name).ok().flatten())
            .collect::<Vec<_>>();
        let rows = self.rows.lock().unwrap().clone();
        let _ = ctx;
        Ok(Box::new(rows.into_iter().map(move |row| {
            let key = indices
                .iter()
                .map(|i| format!("{:?}", row[*i]))
                .collect::<Vec<_>>()
                .join("\u{1}")
                .into_bytes();
            Ok(IndexKeyValue { key, values: row })
        })))
    }

    fn with_index_lookup(&self, _lookup: Vec<u8>) -> Arc<dyn Table> {
        panic!("MemoryTable does not support pushed-down index lookups")
    }
}

/// An in-memory collection of `MemoryTable`s, keyed by name.
pub struct MemoryDatabase {
    name: SmolStr,
    tables: Mutex<IndexMap<SmolStr, Arc<dyn Table>>>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        MemoryDatabase {
            name: name.into(),
            tables: Mutex::new(IndexMap::default()),
        }
    }

    pub fn add_table(&self, table: Arc<dyn Table>) {
        self.tables
            .lock()
            .unwrap()
            .insert(table.name().into(), table);
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn tables(&self) -> IndexMap<SmolStr, Arc<dyn Table>> {
        self.tables.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsql_core::{Column, DataType, MemoryManager, Session, Value};

    fn ctx() -> Context {
        Context::new(
            Arc::new(Session::new("127.0.0.1:3306", "10.0.0.1:1", "root", 1)),
            Arc::new(MemoryManager::new(1 << 20)),
            1,
            "SELECT 1",
        )
    }

    #[test]
    fn reads_back_inserted_rows() {
        let table = MemoryTable::new(
            "t",
            Schema::new(vec![Column::new("a", DataType::Int, false)]),
        );
        table.insert(vec![Value::Int(1)]);
        table.insert(vec![Value::Int(2)]);
        let ctx = ctx();
        let partition = table.partitions(&ctx).unwrap().next().unwrap();
        let mut iter = table.partition_rows(&ctx, &partition).unwrap();
        let mut out = Vec::new();
        while let Some(row) = iter.next().unwrap() {
            out.push(row);
        }
        assert_eq!(out, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn database_looks_up_table_case_insensitively() {
        let db = MemoryDatabase::new("db");
        db.add_table(Arc::new(MemoryTable::new("Users", Schema::empty())));
        assert!(db.table("users").is_some());
    }
}
