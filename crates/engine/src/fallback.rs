//! Last-resort answering after a fatal stage failure.
//!
//! The fallback makes one plain search with the original question and, if
//! the budget still allows it, one fast-path generation bounded by its own
//! timeout. When that is not possible the configured fallback message is
//! returned instead. Only an empty fallback message makes the run fail.

use crate::budget::ApiBudget;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::generator::{no_information_answer, AnswerGenerator};
use crate::search::SearchCoordinator;
use crate::synthesizer::ContextSynthesizer;
use crate::text::grapheme_len;
use crate::types::{IterationTrace, Message, Preferences, Query, StepKind, StepOutput, StepRecord};
use std::time::Instant;

/// Answer produced by the fallback path.
#[derive(Debug, Clone)]
pub struct FallbackAnswer {
    pub answer: String,
    /// Ids of the results the answer was generated from
    pub sources: Vec<String>,
}

pub struct FallbackHandler<'a> {
    coordinator: &'a SearchCoordinator,
    generator: &'a AnswerGenerator,
    config: &'a PipelineConfig,
}

impl<'a> FallbackHandler<'a> {
    pub fn new(
        coordinator: &'a SearchCoordinator,
        generator: &'a AnswerGenerator,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            coordinator,
            generator,
            config,
        }
    }

    /// Produce an answer for `conversation` after `reason` ended the loop.
    ///
    /// Fallback steps are appended to `trace`, the iteration that was
    /// interrupted.
    pub(crate) async fn recover(
        &self,
        conversation: &[Message],
        question: &str,
        preferences: &Preferences,
        budget: &mut ApiBudget,
        trace: &mut IterationTrace,
        reason: &StageError,
    ) -> Result<FallbackAnswer, StageError> {
        tracing::warn!("Falling back after: {}", reason);

        let started = Instant::now();
        let queries = [Query::new(question)];
        let outcome = self
            .coordinator
            .search(&queries, self.config.search_limit, self.config)
            .await;
        trace.record(StepRecord::new(
            StepKind::FallbackSearch,
            started,
            outcome.partial_failure().as_ref(),
            StepOutput::Search {
                queries: vec![question.to_string()],
                result_count: outcome.results.len(),
                failed_calls: outcome.failed_calls,
            },
        ));

        let context = ContextSynthesizer::from_config(self.config).synthesize(&outcome.results, question);
        let sources: Vec<String> = outcome.results.iter().map(|r| r.id.clone()).collect();

        if context.is_empty() {
            let answer = no_information_answer(question);
            trace.record(StepRecord::new(
                StepKind::FallbackGeneration,
                Instant::now(),
                None,
                StepOutput::Generation {
                    answer_chars: grapheme_len(&answer),
                    fast_path: true,
                    no_context: true,
                },
            ));
            return Ok(FallbackAnswer {
                answer,
                sources: Vec::new(),
            });
        }

        let started = Instant::now();
        let generated = match tokio::time::timeout(
            self.config.fallback_timeout(),
            self.generator
                .generate(conversation, &context, preferences, true, budget),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StageError::DeadlineExceeded(self.config.fallback_timeout_ms)),
        };

        match generated {
            Ok(answer) => {
                trace.record(StepRecord::new(
                    StepKind::FallbackGeneration,
                    started,
                    None,
                    StepOutput::Generation {
                        answer_chars: grapheme_len(&answer),
                        fast_path: true,
                        no_context: false,
                    },
                ));
                Ok(FallbackAnswer { answer, sources })
            }
            Err(err) => {
                trace.record(StepRecord::new(
                    StepKind::FallbackGeneration,
                    started,
                    Some(&err),
                    StepOutput::None,
                ));
                tracing::warn!("Fallback generation failed: {}", err);
                self.static_answer(&err)
            }
        }
    }

    fn static_answer(&self, cause: &StageError) -> Result<FallbackAnswer, StageError> {
        let message = self.config.fallback_message.trim();
        if message.is_empty() {
            return Err(StageError::FallbackFailure(format!(
                "no fallback message configured ({})",
                cause
            )));
        }
        Ok(FallbackAnswer {
            answer: message.to_string(),
            sources: Vec::new(),
        })
    }
}
