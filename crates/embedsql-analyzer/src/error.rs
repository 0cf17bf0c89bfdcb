use embedsql_core::PlanError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyzeError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("analyzer did not reach a fixed point after {0} iterations")]
    FixedPointNotReached(usize),
}

pub type AnalyzeResult<T> = Result<T, AnalyzeError>;
