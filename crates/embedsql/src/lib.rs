//! The embeddable SQL engine's public facade: one `Engine` over a catalog,
//! a rule-driven analyzer and the pull-based executor, unifying every crate
//! boundary's error type into `EngineError`. This crate consumes an
//! already-built unresolved `PlanNode`; parsing MySQL-dialect query text
//! into that plan is a front-end's job, not this engine's.

pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};

pub use embedsql_core::{
    CancellationToken, Column, Context, DataType, Expression, JoinKind, MemoryManager, PlanNode, ProcessRow, Row,
    RowIter, Schema, Session, SortField, Value,
};
