//! Error types for Reasoner.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application, including configuration, I/O, LLM, search, prompt,
//! and pipeline errors.

use thiserror::Error;

/// Unified error type for Reasoner.
///
/// All fallible public functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Text generation provider errors (generation unavailable)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector search provider errors (search unavailable)
    #[error("Search error: {0}")]
    Search(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Reasoning pipeline errors (invalid input, invalid run state)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// The last-resort answer path failed; no answer could be produced
    #[error("Fallback failed: {0}")]
    Fallback(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::Search("qdrant unreachable".to_string());
        assert_eq!(err.to_string(), "Search error: qdrant unreachable");

        let err = AppError::Fallback("no answer".to_string());
        assert!(err.to_string().starts_with("Fallback failed"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
