//! Stage-level error taxonomy for the reasoning loop.
//!
//! Every stage reports failures as a `StageError`. Non-fatal values are
//! written into the step trace and the run carries on; fatal values divert
//! the run to the fallback path. Only a failed fallback reaches the caller,
//! converted into an [`AppError`].

use reasoner_core::AppError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// Query expansion failed; keyword queries were used instead
    #[error("query planning degraded to keyword fallback: {0}")]
    PlanningDegraded(String),

    /// Some search calls failed or timed out; their results are missing
    #[error("{failed} of {total} search calls failed")]
    SearchPartialFailure { failed: usize, total: usize },

    /// The text generation provider could not produce an answer
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The strict validation response was not usable; defaults applied
    #[error("validation response could not be parsed: {0}")]
    ValidationParseFailure(String),

    /// No API calls remain for the requested stage
    #[error("API call budget exhausted ({used}/{max} calls used)")]
    BudgetExhausted { used: u32, max: u32 },

    /// The run ran past its overall deadline
    #[error("run deadline of {0} ms exceeded")]
    DeadlineExceeded(u64),

    /// The last-resort path could not produce an answer
    #[error("fallback failed: {0}")]
    FallbackFailure(String),
}

impl StageError {
    /// Whether this error ends the current iteration and triggers the fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::GenerationUnavailable(_) | Self::DeadlineExceeded(_) | Self::FallbackFailure(_)
        )
    }
}

impl From<StageError> for AppError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::FallbackFailure(msg) => AppError::Fallback(msg),
            StageError::GenerationUnavailable(msg) => AppError::Llm(msg),
            other => AppError::Pipeline(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(StageError::GenerationUnavailable("x".into()).is_fatal());
        assert!(StageError::DeadlineExceeded(10).is_fatal());
        assert!(!StageError::PlanningDegraded("x".into()).is_fatal());
        assert!(!StageError::BudgetExhausted { used: 3, max: 3 }.is_fatal());
        assert!(!StageError::SearchPartialFailure { failed: 1, total: 2 }.is_fatal());
    }

    #[test]
    fn test_fallback_failure_converts_to_app_error() {
        let err: AppError = StageError::FallbackFailure("nothing left".into()).into();
        assert!(matches!(err, AppError::Fallback(_)));
    }

    #[test]
    fn test_display() {
        let err = StageError::SearchPartialFailure { failed: 1, total: 3 };
        assert_eq!(err.to_string(), "1 of 3 search calls failed");
    }
}
