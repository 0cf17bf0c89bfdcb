//! Plan tree, expression, schema and storage-trait primitives shared by the
//! rest of the engine. This crate knows nothing about SQL syntax, rule
//! scheduling or concrete storage; it only defines the vocabulary those
//! layers build on.

pub mod catalog_handle;
pub mod context;
pub mod error;
pub mod expression;
pub mod plan;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod value;

pub use catalog_handle::{CatalogHandle, IndexBuildSession, IndexInfo, IndexSpec, ProcessRow, TableStatusRow};
pub use context::{CancellationToken, Context, MemoryManager, Pid, Session};
pub use error::{PlanError, PlanResult};
pub use expression::{transform_expr_up, AggregateKind, Expression, FunctionImpl};
pub use plan::{JoinKind, PlanNode, SortField};
pub use schema::{Column, Schema};
pub use storage::{Database, IndexKeyValue, IndexableTable, Partition, RowIter, Table};
pub use transform::{transform_down, transform_expressions_up, transform_up, transform_up_respecting_opaque};
pub use value::{DataType, Row, Value};
