use embedsql_core::PlanError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("cannot execute an unresolved plan: {0}")]
    Unresolved(&'static str),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<ExecError> for PlanError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Plan(e) => e,
            ExecError::Unresolved(node) => PlanError::UnsupportedFeature(node.into()),
        }
    }
}
