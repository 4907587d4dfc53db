//! Iterative retrieval-augmented answering.
//!
//! A question runs through a bounded loop of search, context synthesis,
//! generation and validation. Each run has an API call budget, an
//! iteration cap and a deadline, and always ends with an answer unless the
//! fallback itself has nothing to say.

pub mod budget;
pub mod config;
pub mod error;
pub mod factory;
pub mod generator;
pub mod planner;
pub mod provider;
pub mod search;
pub mod synthesizer;
pub mod text;
pub mod types;
pub mod validator;

mod controller;
mod fallback;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{load_config, PipelineConfig};
pub use error::StageError;
pub use factory::build_engine;
pub use provider::{GenerationProvider, LlmGenerationProvider};
pub use search::{SearchClient, SearchCoordinator};
pub use types::{
    Context, Iteration, Message, Preferences, Query, Role, RunResult, SearchResult, StepKind,
    StepOutput, StepRecord,
};

use controller::IterationController;
use reasoner_core::{AppError, AppResult};
use reasoner_prompt::PromptSet;
use std::sync::Arc;
use tracing::Instrument;

/// Entry point for answering questions.
///
/// Holds the long-lived collaborators; all per-run state (budget, trace,
/// deadline) lives in the run itself, so one engine can serve concurrent
/// runs.
#[derive(Clone)]
pub struct ReasoningEngine {
    coordinator: SearchCoordinator,
    provider: Arc<dyn GenerationProvider>,
    prompts: Arc<PromptSet>,
}

impl ReasoningEngine {
    pub fn new(clients: Vec<Arc<dyn SearchClient>>, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            coordinator: SearchCoordinator::new(clients),
            provider,
            prompts: Arc::new(PromptSet::builtin()),
        }
    }

    /// Replace the built-in prompts used for planning and strict validation.
    pub fn with_prompts(mut self, prompts: Arc<PromptSet>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Answer `question` given the earlier conversation `history`.
    ///
    /// Fails only for invalid input, an invalid `config`, or when the
    /// fallback cannot produce any answer.
    pub async fn run(
        &self,
        question: &str,
        history: &[Message],
        preferences: &Preferences,
        config: &PipelineConfig,
    ) -> AppResult<RunResult> {
        config.validate()?;

        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Pipeline("Question must not be empty".to_string()));
        }

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "reasoning_run",
            run_id = %run_id,
            question_len = question.len()
        );

        async {
            tracing::info!(
                "Answering question with {} search clients (max {} iterations, {} API calls)",
                self.coordinator.client_count(),
                config.max_iterations,
                config.max_api_calls
            );

            IterationController::new(
                &self.coordinator,
                self.provider.clone(),
                self.prompts.clone(),
                config,
                run_id,
            )
            .run(question, history, preferences)
            .await
        }
        .instrument(span)
        .await
    }
}
