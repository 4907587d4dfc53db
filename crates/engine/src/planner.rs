//! Query planning.
//!
//! Turns a question into a short list of search queries. The original
//! question always comes first. Extra queries come from a model-generated
//! expansion or, when that is not possible, from the question's keywords.

use crate::budget::ApiBudget;
use crate::error::StageError;
use crate::provider::GenerationProvider;
use crate::text::keyword_tokens;
use crate::types::{Preferences, Query};
use reasoner_prompt::defaults::QUERY_EXPANSION;
use reasoner_prompt::{build_prompt, PromptSet};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How the planner may derive additional queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// One generation call to expand the question
    Expand,
    /// Keyword extraction only; no generation call
    Keywords,
}

/// Output of one planning pass.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Queries in relevance order; the first is always the question
    pub queries: Vec<Query>,

    /// Whether the extra queries came from a model expansion
    pub expanded: bool,

    /// Set when expansion was attempted but keyword fallback was used
    pub degraded: Option<StageError>,
}

impl PlanOutcome {
    pub fn query_texts(&self) -> Vec<String> {
        self.queries.iter().map(|q| q.text.clone()).collect()
    }
}

pub struct QueryPlanner {
    provider: Arc<dyn GenerationProvider>,
    prompts: Arc<PromptSet>,
}

impl QueryPlanner {
    pub fn new(provider: Arc<dyn GenerationProvider>, prompts: Arc<PromptSet>) -> Self {
        Self { provider, prompts }
    }

    /// Plan up to `max_queries` queries for `question`.
    ///
    /// Never fails: every expansion problem degrades to keyword queries and
    /// is reported through [`PlanOutcome::degraded`].
    pub async fn plan(
        &self,
        question: &str,
        preferences: &Preferences,
        max_queries: usize,
        mode: PlanMode,
        budget: &mut ApiBudget,
    ) -> PlanOutcome {
        let question = question.trim();
        let extra = max_queries.saturating_sub(1);

        if extra == 0 {
            return PlanOutcome {
                queries: vec![Query::new(question)],
                expanded: false,
                degraded: None,
            };
        }

        if mode == PlanMode::Keywords {
            return PlanOutcome {
                queries: assemble(question, keyword_fallback(question, extra + 1), extra),
                expanded: false,
                degraded: None,
            };
        }

        match self.expand(question, preferences, extra, budget).await {
            Ok(terms) => PlanOutcome {
                queries: assemble(question, terms, extra),
                expanded: true,
                degraded: None,
            },
            Err(err) => {
                tracing::warn!("Query expansion failed, using keywords: {}", err);
                PlanOutcome {
                    queries: assemble(question, keyword_fallback(question, extra + 1), extra),
                    expanded: false,
                    degraded: Some(err),
                }
            }
        }
    }

    async fn expand(
        &self,
        question: &str,
        preferences: &Preferences,
        count: usize,
        budget: &mut ApiBudget,
    ) -> Result<Vec<String>, StageError> {
        budget.try_consume()?;

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("count".to_string(), count.to_string());
        if !preferences.focus_topics.is_empty() {
            vars.insert("focus".to_string(), preferences.focus_topics.join(", "));
        }

        let degraded = |e: reasoner_core::AppError| StageError::PlanningDegraded(e.to_string());
        let definition = self.prompts.get(QUERY_EXPANSION).map_err(degraded)?;
        let built = build_prompt(definition, &vars).map_err(degraded)?;
        let raw = self
            .provider
            .generate_text(&built.user)
            .await
            .map_err(degraded)?;

        let terms = parse_expansion(&raw).ok_or_else(|| {
            StageError::PlanningDegraded("expansion response is not a JSON string array".to_string())
        })?;

        let useful = distinct_terms(question, terms);
        if useful.is_empty() {
            return Err(StageError::PlanningDegraded(
                "expansion produced no new queries".to_string(),
            ));
        }
        Ok(useful)
    }
}

/// Parse a JSON string array embedded anywhere in `raw`.
pub fn parse_expansion(raw: &str) -> Option<Vec<String>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&raw[start..=end]).ok()
}

/// Up to `limit` keyword queries taken from the question itself.
pub fn keyword_fallback(question: &str, limit: usize) -> Vec<String> {
    keyword_tokens(question).into_iter().take(limit).collect()
}

/// Trimmed, non-empty terms that differ from the question and each other.
fn distinct_terms(question: &str, terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    seen.insert(question.to_lowercase());
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

fn assemble(question: &str, extra_terms: Vec<String>, extra: usize) -> Vec<Query> {
    std::iter::once(question.to_string())
        .chain(distinct_terms(question, extra_terms).into_iter().take(extra))
        .map(Query::new)
        .collect()
}
