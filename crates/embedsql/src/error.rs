use embedsql_analyzer::AnalyzeError;
use embedsql_core::PlanError;
use embedsql_exec::ExecError;
use thiserror::Error;

/// Unifies every crate boundary's error type behind one enum so callers of
/// the facade match on a single type instead of threading four through
/// their own call stacks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_carry_the_offending_identifier() {
        let err: EngineError = PlanError::TableNotFound("orders".into()).into();
        assert!(err.to_string().contains("orders"));

        let err: EngineError = AnalyzeError::FixedPointNotReached(3).into();
        assert!(err.to_string().contains('3'));

        let err: EngineError = ExecError::Unresolved("Project").into();
        assert!(err.to_string().contains("Project"));
    }
}
