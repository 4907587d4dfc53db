//! Context synthesis from merged search results.
//!
//! Deterministic and free of external calls.

use crate::config::PipelineConfig;
use crate::text::{grapheme_len, truncate_graphemes};
use crate::types::{Context, SearchResult};
use std::collections::BTreeSet;

/// Separator placed between passages in the context text.
const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// A cut-down passage shorter than this is dropped rather than included,
/// except for the top-scored one.
const MIN_PARTIAL_CHARS: usize = 80;

/// Reduces search results to a bounded-size context.
#[derive(Debug, Clone, Copy)]
pub struct ContextSynthesizer {
    max_chars: usize,
    target_result_count: usize,
}

impl ContextSynthesizer {
    pub fn new(max_chars: usize, target_result_count: usize) -> Self {
        Self {
            max_chars,
            target_result_count: target_result_count.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.context_max_chars, config.target_result_count)
    }

    /// Build the context for one iteration.
    ///
    /// Passages are added highest score first until the character budget is
    /// spent; the passage that crosses the budget is cut short, everything
    /// after it is left out. The top passage always goes in. Quality reflects how many results were
    /// retrieved, not how many fit.
    pub fn synthesize(&self, results: &[SearchResult], question: &str) -> Context {
        if results.is_empty() {
            tracing::debug!(question_chars = question.len(), "No results to synthesize");
            return Context::empty();
        }

        let mut ordered: Vec<&SearchResult> = results.iter().collect();
        ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut text = String::new();
        let mut used = 0usize;
        let mut included = 0usize;
        let mut topics = BTreeSet::new();

        for result in &ordered {
            topics.extend(result.topics());
        }

        for result in ordered {
            let Some(body) = result.text() else {
                continue;
            };
            let passage = format_passage(included + 1, result, body);

            let separator = if included == 0 { 0 } else { grapheme_len(PASSAGE_SEPARATOR) };
            let available = self.max_chars.saturating_sub(used + separator);
            let passage_len = grapheme_len(&passage);

            let piece = if passage_len <= available {
                passage
            } else if included == 0 || available >= MIN_PARTIAL_CHARS {
                truncate_graphemes(&passage, available)
            } else {
                break;
            };

            if included > 0 {
                text.push_str(PASSAGE_SEPARATOR);
            }
            used += separator + grapheme_len(&piece);
            text.push_str(&piece);
            included += 1;

            if used >= self.max_chars {
                break;
            }
        }

        let quality_score = self.quality(results.len());

        tracing::debug!(
            results = results.len(),
            included,
            chars = used,
            quality_score,
            "Synthesized context"
        );

        Context {
            text,
            topics,
            quality_score,
            included,
            source_count: results.len(),
        }
    }

    /// Context quality for `count` retrieved results, in [0, 1].
    pub fn quality(&self, count: usize) -> f32 {
        (count as f32 / self.target_result_count as f32).min(1.0)
    }
}

fn format_passage(position: usize, result: &SearchResult, body: &str) -> String {
    match result.payload.get("title").and_then(|t| t.as_str()) {
        Some(title) => format!("[Source {}: {}]\n{}", position, title, body.trim()),
        None => format!("[Source {}]\n{}", position, body.trim()),
    }
}
