//! The iterative reasoning loop.
//!
//! One [`IterationController`] drives one run:
//!
//! 1. quick search with the current query
//! 2. on a weak quick result, plan extra queries and search them too
//! 3. synthesize context, generate, validate
//! 4. refine the query with the missing aspects and go again while the
//!    answer is weak, budget remains, and the iteration cap allows
//!
//! Every await runs under the run deadline. Once a pass has produced an
//! answer, a failing refinement pass ends the run with the best answer so
//! far; before that, fatal stage errors divert the run to the
//! [`FallbackHandler`].

use crate::budget::ApiBudget;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::fallback::FallbackHandler;
use crate::generator::{no_information_answer, AnswerGenerator};
use crate::planner::{PlanMode, QueryPlanner};
use crate::provider::GenerationProvider;
use crate::search::{merge_results, SearchCoordinator};
use crate::synthesizer::ContextSynthesizer;
use crate::text::grapheme_len;
use crate::types::{
    millis, Iteration, IterationTrace, Message, Preferences, Query, RunResult, SearchResult,
    StepKind, StepOutput, StepRecord,
};
use crate::validator::{Assessment, QualityValidator};
use reasoner_core::AppResult;
use reasoner_prompt::PromptSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Result of one successful pass through the loop.
struct Pass {
    answer: String,
    assessment: Assessment,
    results: Vec<SearchResult>,
}

pub(crate) struct IterationController<'a> {
    coordinator: &'a SearchCoordinator,
    planner: QueryPlanner,
    generator: AnswerGenerator,
    synthesizer: ContextSynthesizer,
    validator: QualityValidator,
    provider: Arc<dyn GenerationProvider>,
    prompts: Arc<PromptSet>,
    config: &'a PipelineConfig,
    run_id: Uuid,
    started: Instant,
    deadline: tokio::time::Instant,
    budget: ApiBudget,
    iterations: Vec<Iteration>,
}

impl<'a> IterationController<'a> {
    pub(crate) fn new(
        coordinator: &'a SearchCoordinator,
        provider: Arc<dyn GenerationProvider>,
        prompts: Arc<PromptSet>,
        config: &'a PipelineConfig,
        run_id: Uuid,
    ) -> Self {
        Self {
            coordinator,
            planner: QueryPlanner::new(provider.clone(), prompts.clone()),
            generator: AnswerGenerator::new(provider.clone()),
            synthesizer: ContextSynthesizer::from_config(config),
            validator: QualityValidator::from_config(config),
            provider,
            prompts,
            config,
            run_id,
            started: Instant::now(),
            deadline: tokio::time::Instant::now() + config.run_deadline(),
            budget: ApiBudget::new(config.max_api_calls),
            iterations: Vec::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        question: &str,
        history: &[Message],
        preferences: &Preferences,
    ) -> AppResult<RunResult> {
        let mut conversation = history.to_vec();
        conversation.push(Message::user(question));

        let mut query = question.to_string();
        let mut carried: Vec<SearchResult> = Vec::new();
        let mut best: Option<Pass> = None;

        for index in 0..self.config.max_iterations {
            let mut trace = IterationTrace::start(index);

            let outcome = self
                .iterate(&mut trace, &conversation, question, &query, &carried, preferences)
                .await;
            let pass = match outcome {
                Ok(pass) => pass,
                Err(err) if best.is_some() => {
                    // A refinement pass failed; the earlier answer stands
                    // and the failed step stays in the trace
                    tracing::warn!(iteration = index, fatal = err.is_fatal(), "Stopping refinement: {}", err);
                    self.iterations.push(trace.finish(0.0, false));
                    break;
                }
                Err(err) => {
                    return self
                        .fall_back(trace, &conversation, question, preferences, err)
                        .await;
                }
            };

            let is_last = index + 1 >= self.config.max_iterations;
            let should_continue = pass.assessment.needs_more_context
                && self.budget.allows_refinement()
                && !is_last;

            tracing::info!(
                iteration = index,
                confidence = pass.assessment.confidence,
                api_calls = self.budget.used(),
                should_continue,
                "Iteration complete"
            );

            self.iterations
                .push(trace.finish(pass.assessment.confidence, should_continue));

            query = refine_query(question, &pass.assessment.missing_aspects);
            carried = pass.results.clone();

            if best
                .as_ref()
                .map_or(true, |b| pass.assessment.confidence >= b.assessment.confidence)
            {
                best = Some(pass);
            }

            if !should_continue {
                break;
            }
        }

        match best {
            Some(pass) => Ok(self.finish(pass)),
            None => {
                let trace = IterationTrace::start(self.iterations.len() as u32);
                let reason = self.budget.exhausted();
                self.fall_back(trace, &conversation, question, preferences, reason)
                    .await
            }
        }
    }

    /// One pass of the loop. Non-fatal stage errors are recorded in `trace`.
    async fn iterate(
        &mut self,
        trace: &mut IterationTrace,
        conversation: &[Message],
        question: &str,
        query: &str,
        carried: &[SearchResult],
        preferences: &Preferences,
    ) -> Result<Pass, StageError> {
        let config = self.config;
        let deadline = self.deadline;

        // Quick search
        let started = Instant::now();
        let queries = [Query::new(query)];
        let quick = within(deadline, config, self.coordinator.search(&queries, config.search_limit, config))
            .await
            .map_err(|e| failed(trace, StepKind::QuickSearch, started, e))?;
        trace.record(StepRecord::new(
            StepKind::QuickSearch,
            started,
            quick.partial_failure().as_ref(),
            StepOutput::Search {
                queries: vec![query.to_string()],
                result_count: quick.results.len(),
                failed_calls: quick.failed_calls,
            },
        ));

        let quick_path = self.is_quick_path(&quick.results);
        let mut merged = merge_results(
            [quick.results, carried.to_vec()],
            config.score_threshold,
            config.result_cap,
        );

        if !quick_path {
            merged = self
                .plan_and_search(trace, query, preferences, merged)
                .await?;
        }

        // Synthesis
        let started = Instant::now();
        let context = self.synthesizer.synthesize(&merged, question);
        trace.record(StepRecord::new(
            StepKind::Synthesis,
            started,
            None,
            StepOutput::Synthesis {
                context_chars: grapheme_len(&context.text),
                included: context.included,
                topics: context.topics.iter().cloned().collect(),
                quality_score: context.quality_score,
            },
        ));

        // Generation
        let started = Instant::now();
        let answer = if context.is_empty() {
            no_information_answer(question)
        } else {
            within(
                deadline,
                config,
                self.generator
                    .generate(conversation, &context, preferences, quick_path, &mut self.budget),
            )
            .await
            .and_then(|generated| generated)
            .map_err(|e| failed(trace, StepKind::Generation, started, e))?
        };
        trace.record(StepRecord::new(
            StepKind::Generation,
            started,
            None,
            StepOutput::Generation {
                answer_chars: grapheme_len(&answer),
                fast_path: quick_path,
                no_context: context.is_empty(),
            },
        ));

        // Validation
        let started = Instant::now();
        let (assessment, validation_error) = if config.use_strict_validation && !context.is_empty() {
            within(
                deadline,
                config,
                self.validator.assess_strict(
                    self.provider.as_ref(),
                    &self.prompts,
                    question,
                    &merged,
                    &context,
                    &answer,
                    &mut self.budget,
                ),
            )
            .await
            .map_err(|e| failed(trace, StepKind::Validation, started, e))?
        } else {
            (self.validator.assess(&merged, &answer, question), None)
        };
        trace.record(StepRecord::new(
            StepKind::Validation,
            started,
            validation_error.as_ref(),
            StepOutput::Validation {
                confidence: assessment.confidence,
                needs_more_context: assessment.needs_more_context,
                missing_aspects: assessment.missing_aspects.clone(),
                strict: assessment.strict,
            },
        ));

        Ok(Pass {
            answer,
            assessment,
            results: merged,
        })
    }

    /// Plan extra queries and merge their results into `merged`.
    async fn plan_and_search(
        &mut self,
        trace: &mut IterationTrace,
        query: &str,
        preferences: &Preferences,
        merged: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, StageError> {
        let config = self.config;
        let deadline = self.deadline;

        // Expansion must leave room for the generation call
        let affordable = self.budget.can_afford(2);
        let mode = if preferences.expand_queries && affordable {
            PlanMode::Expand
        } else {
            PlanMode::Keywords
        };
        let budget_note = (preferences.expand_queries && !affordable).then(|| self.budget.exhausted());

        let started = Instant::now();
        let plan = within(
            deadline,
            config,
            self.planner
                .plan(query, preferences, config.max_queries, mode, &mut self.budget),
        )
        .await
        .map_err(|e| failed(trace, StepKind::Planning, started, e))?;
        trace.record(StepRecord::new(
            StepKind::Planning,
            started,
            plan.degraded.as_ref().or(budget_note.as_ref()),
            StepOutput::Plan {
                queries: plan.query_texts(),
                expanded: plan.expanded,
            },
        ));

        // The first planned query is the one the quick search already ran
        let extra: Vec<Query> = plan.queries.into_iter().skip(1).collect();
        if extra.is_empty() {
            return Ok(merged);
        }

        let started = Instant::now();
        let expanded = within(deadline, config, self.coordinator.search(&extra, config.search_limit, config))
            .await
            .map_err(|e| failed(trace, StepKind::ExpandedSearch, started, e))?;
        trace.record(StepRecord::new(
            StepKind::ExpandedSearch,
            started,
            expanded.partial_failure().as_ref(),
            StepOutput::Search {
                queries: extra.iter().map(|q| q.text.clone()).collect(),
                result_count: expanded.results.len(),
                failed_calls: expanded.failed_calls,
            },
        ));

        Ok(merge_results(
            [merged, expanded.results],
            config.score_threshold,
            config.result_cap,
        ))
    }

    /// Strong quick results skip planning and use the fast answer path.
    fn is_quick_path(&self, results: &[SearchResult]) -> bool {
        if results.is_empty() {
            return false;
        }
        let quality = self.synthesizer.quality(results.len());
        quality > self.config.quick_path_quality
            || results.len() >= self.config.quick_path_min_results
    }

    async fn fall_back(
        mut self,
        mut trace: IterationTrace,
        conversation: &[Message],
        question: &str,
        preferences: &Preferences,
        reason: StageError,
    ) -> AppResult<RunResult> {
        let handler = FallbackHandler::new(self.coordinator, &self.generator, self.config);
        let recovered = handler
            .recover(
                conversation,
                question,
                preferences,
                &mut self.budget,
                &mut trace,
                &reason,
            )
            .await;
        self.iterations.push(trace.finish(0.0, false));
        let recovered = recovered?;

        tracing::info!(
            api_calls = self.budget.used(),
            reason = %reason,
            "Run answered by fallback"
        );

        Ok(RunResult {
            run_id: self.run_id,
            answer: recovered.answer,
            iterations: self.iterations,
            final_confidence: 0.0,
            api_calls_used: self.budget.used(),
            used_fallback: true,
            fallback_reason: Some(reason.to_string()),
            sources: recovered.sources,
            total_duration_ms: millis(self.started.elapsed()),
        })
    }

    fn finish(self, pass: Pass) -> RunResult {
        tracing::info!(
            iterations = self.iterations.len(),
            confidence = pass.assessment.confidence,
            api_calls = self.budget.used(),
            "Run complete"
        );

        RunResult {
            run_id: self.run_id,
            answer: pass.answer,
            iterations: self.iterations,
            final_confidence: pass.assessment.confidence,
            api_calls_used: self.budget.used(),
            used_fallback: false,
            fallback_reason: None,
            sources: pass.results.into_iter().map(|r| r.id).collect(),
            total_duration_ms: millis(self.started.elapsed()),
        }
    }
}

/// Await `future` unless the run deadline passes first.
async fn within<F: Future>(
    deadline: tokio::time::Instant,
    config: &PipelineConfig,
    future: F,
) -> Result<F::Output, StageError> {
    tokio::time::timeout_at(deadline, future)
        .await
        .map_err(|_| StageError::DeadlineExceeded(config.run_deadline_ms))
}

/// Record a failed step and hand the error back.
fn failed(trace: &mut IterationTrace, kind: StepKind, started: Instant, err: StageError) -> StageError {
    trace.record(StepRecord::new(kind, started, Some(&err), StepOutput::None));
    err
}

/// Next iteration's query: the question plus what the last answer missed.
pub fn refine_query(question: &str, missing_aspects: &[String]) -> String {
    if missing_aspects.is_empty() {
        return question.to_string();
    }
    format!("{} {}", question, missing_aspects.join(" "))
}
