//! Answer generation: one provider call per invocation.

use crate::budget::ApiBudget;
use crate::error::StageError;
use crate::provider::GenerationProvider;
use crate::types::{Context, Message, Preferences};
use std::sync::Arc;

/// Wraps the provider's answer call with budget accounting.
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn GenerationProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    /// Generate an answer for the last user message in `history`.
    ///
    /// Consumes exactly one budget call. Provider failures and blank answers
    /// are reported as `GenerationUnavailable`; they are never swallowed.
    pub async fn generate(
        &self,
        history: &[Message],
        context: &Context,
        preferences: &Preferences,
        allow_fast_path: bool,
        budget: &mut ApiBudget,
    ) -> Result<String, StageError> {
        budget.try_consume()?;

        let answer = self
            .provider
            .generate_response(history, context, preferences, allow_fast_path)
            .await
            .map_err(|e| StageError::GenerationUnavailable(e.to_string()))?;

        if answer.trim().is_empty() {
            return Err(StageError::GenerationUnavailable(
                "provider returned an empty answer".to_string(),
            ));
        }

        Ok(answer)
    }
}

/// Fixed answer used when retrieval found nothing to ground an answer on.
pub fn no_information_answer(question: &str) -> String {
    format!(
        "I could not find information about \"{}\" in the available documents.",
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::stubs::StubProvider;

    #[tokio::test]
    async fn test_generate_consumes_one_call() {
        let provider = Arc::new(StubProvider::answering("Ein Bilanzkreis ist ..."));
        let generator = AnswerGenerator::new(provider.clone());
        let mut budget = ApiBudget::new(3);

        let answer = generator
            .generate(
                &[Message::user("q")],
                &Context::empty(),
                &Preferences::default(),
                true,
                &mut budget,
            )
            .await
            .unwrap();

        assert_eq!(answer, "Ein Bilanzkreis ist ...");
        assert_eq!(budget.used(), 1);
        assert_eq!(provider.response_calls(), 1);
        assert_eq!(provider.fast_path_calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let generator = AnswerGenerator::new(Arc::new(StubProvider::failing()));
        let mut budget = ApiBudget::new(3);

        let err = generator
            .generate(
                &[Message::user("q")],
                &Context::empty(),
                &Preferences::default(),
                false,
                &mut budget,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::GenerationUnavailable(_)));
        assert!(err.is_fatal());
        // The attempt still counts against the budget
        assert_eq!(budget.used(), 1);
    }

    #[tokio::test]
    async fn test_blank_answer_is_unavailable() {
        let generator = AnswerGenerator::new(Arc::new(StubProvider::answering("  ")));
        let mut budget = ApiBudget::new(1);
        let err = generator
            .generate(
                &[Message::user("q")],
                &Context::empty(),
                &Preferences::default(),
                false,
                &mut budget,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_provider() {
        let provider = Arc::new(StubProvider::answering("never"));
        let generator = AnswerGenerator::new(provider.clone());
        let mut budget = ApiBudget::new(0);

        let err = generator
            .generate(
                &[Message::user("q")],
                &Context::empty(),
                &Preferences::default(),
                false,
                &mut budget,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::BudgetExhausted { .. }));
        assert_eq!(provider.response_calls(), 0);
    }

    #[test]
    fn test_no_information_answer() {
        let answer = no_information_answer("  Was ist ein Bilanzkreis? ");
        assert!(answer.contains("\"Was ist ein Bilanzkreis?\""));
    }
}
