use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("database not found: {0}")]
    DatabaseNotFound(SmolStr),

    #[error("database already exists: {0}")]
    DatabaseExists(SmolStr),

    #[error("table not found: {0}.{1}")]
    TableNotFound(SmolStr, SmolStr),

    #[error("index not found: {0}")]
    IndexNotFound(SmolStr),

    #[error("index already exists: {0}")]
    IndexExists(SmolStr),

    #[error("index driver not found: {0}")]
    DriverNotFound(SmolStr),

    #[error("function not found: {0}")]
    FunctionNotFound(SmolStr),

    #[error("error calling function {0}: {1}")]
    FunctionCallError(SmolStr, SmolStr),

    #[error("process not found: {0}")]
    ProcessNotFound(u64),

    #[error("tables are locked")]
    TablesLocked,
}

pub type CatalogResult<T> = Result<T, CatalogError>;
