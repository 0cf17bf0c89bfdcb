use smol_str::SmolStr;
use thiserror::Error;

/// Stable, MySQL-front-end-renderable error kinds for the core query
/// lifecycle. Every variant carries the offending identifier so the message
/// is useful without a wrapping context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("table not found: {0}")]
    TableNotFound(SmolStr),

    #[error("database not found: {0}")]
    DatabaseNotFound(SmolStr),

    #[error("column not found: {0}")]
    ColumnNotFound(SmolStr),

    #[error("ambiguous column: {0}")]
    AmbiguousColumn(SmolStr),

    #[error("function not found: {0}")]
    FunctionNotFound(SmolStr),

    #[error("{node} expects {expected} children, got {actual}")]
    InvalidChildrenNumber {
        node: SmolStr,
        expected: usize,
        actual: usize,
    },

    #[error("invalid format {0:?} for DESCRIBE, supported formats: tree")]
    InvalidDescribeFormat(SmolStr),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(SmolStr),

    #[error("evaluating a star placeholder: {0}")]
    StarPlaceholder(SmolStr),

    #[error("type error: {0}")]
    TypeError(SmolStr),
}

pub type PlanResult<T> = Result<T, PlanError>;
