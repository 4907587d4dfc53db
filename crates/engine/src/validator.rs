//! Answer quality assessment.
//!
//! Two paths return the same [`Assessment`] shape:
//! - a deterministic heuristic over the retrieved results (default, free)
//! - a strict path that asks the generation provider to grade the answer
//!   (one extra call), falling back to conservative defaults when the
//!   response cannot be parsed

use crate::budget::ApiBudget;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::provider::GenerationProvider;
use crate::text::{grapheme_len, keyword_tokens};
use crate::types::{Context, SearchResult};
use reasoner_prompt::defaults::VALIDATION;
use reasoner_prompt::{build_prompt, PromptSet};
use serde::Deserialize;
use std::collections::HashMap;

/// Confidence reported when a strict response cannot be parsed.
const UNPARSED_CONFIDENCE: f32 = 0.7;

/// Upper bound on reported missing aspects.
const MAX_MISSING_ASPECTS: usize = 3;

/// Verdict on one generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub confidence: f32,
    pub needs_more_context: bool,
    /// Aspects of the question the retrieved material does not cover
    pub missing_aspects: Vec<String>,
    pub strict: bool,
}

/// Raw strict-validation response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    confidence: f32,
    #[serde(default)]
    needs_more_context: Option<bool>,
    #[serde(default)]
    missing_aspects: Vec<String>,
}

/// Scores answers and decides whether another iteration is warranted.
#[derive(Debug, Clone, Copy)]
pub struct QualityValidator {
    quality_threshold: f32,
    full_results: usize,
    min_answer_chars: usize,
}

impl QualityValidator {
    pub fn new(quality_threshold: f32, full_results: usize, min_answer_chars: usize) -> Self {
        Self {
            quality_threshold,
            full_results: full_results.max(1),
            min_answer_chars,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.quality_threshold,
            config.confidence_full_results,
            config.min_answer_chars,
        )
    }

    /// Heuristic assessment; no external calls.
    ///
    /// Confidence saturates at `full_results` results and falls into fixed
    /// bands below that. Short answers lose half their confidence. Question
    /// keywords that appear in no result are reported as missing aspects.
    pub fn assess(&self, results: &[SearchResult], answer: &str, question: &str) -> Assessment {
        let mut confidence = self.result_confidence(results.len());

        if grapheme_len(answer.trim()) < self.min_answer_chars {
            confidence *= 0.5;
        }

        let missing_aspects = missing_aspects(results, question);

        Assessment {
            confidence,
            needs_more_context: confidence < self.quality_threshold,
            missing_aspects,
            strict: false,
        }
    }

    fn result_confidence(&self, count: usize) -> f32 {
        if count >= self.full_results {
            (count as f32 / self.full_results as f32).min(1.0)
        } else if count >= 3 {
            0.6
        } else if count >= 1 {
            0.4
        } else {
            0.0
        }
    }

    /// Strict assessment through the generation provider.
    ///
    /// Consumes one budget call. Provider errors and unparseable responses
    /// both yield the conservative default, reported as a non-fatal
    /// `ValidationParseFailure`.
    #[allow(clippy::too_many_arguments)]
    pub async fn assess_strict(
        &self,
        provider: &dyn GenerationProvider,
        prompts: &PromptSet,
        question: &str,
        results: &[SearchResult],
        context: &Context,
        answer: &str,
        budget: &mut ApiBudget,
    ) -> (Assessment, Option<StageError>) {
        if let Err(err) = budget.try_consume() {
            return (self.assess(results, answer, question), Some(err));
        }

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("answer".to_string(), answer.to_string());
        vars.insert("context".to_string(), context.text.clone());
        vars.insert("result_count".to_string(), results.len().to_string());

        let raw = match prompts.get(VALIDATION).and_then(|def| build_prompt(def, &vars)) {
            Ok(built) => provider.generate_text(&built.user).await,
            Err(e) => Err(e),
        };

        let parsed = raw
            .map_err(|e| StageError::ValidationParseFailure(e.to_string()))
            .and_then(|raw| self.parse_assessment(&raw));

        match parsed {
            Ok(assessment) => (assessment, None),
            Err(err) => {
                tracing::warn!("Strict validation degraded: {}", err);
                (Self::conservative_default(), Some(err))
            }
        }
    }

    /// Parse the first JSON object in a strict-validation response.
    pub fn parse_assessment(&self, raw: &str) -> Result<Assessment, StageError> {
        let json = extract_json_object(raw)
            .ok_or_else(|| StageError::ValidationParseFailure("no JSON object found".to_string()))?;

        let parsed: RawAssessment = serde_json::from_str(json)
            .map_err(|e| StageError::ValidationParseFailure(e.to_string()))?;

        if !parsed.confidence.is_finite() {
            return Err(StageError::ValidationParseFailure(
                "confidence is not a number".to_string(),
            ));
        }

        let confidence = parsed.confidence.clamp(0.0, 1.0);
        let mut missing_aspects: Vec<String> = parsed
            .missing_aspects
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        missing_aspects.truncate(MAX_MISSING_ASPECTS);

        Ok(Assessment {
            confidence,
            needs_more_context: parsed
                .needs_more_context
                .unwrap_or(confidence < self.quality_threshold),
            missing_aspects,
            strict: true,
        })
    }

    /// Default that lets the loop terminate when grading failed.
    pub fn conservative_default() -> Assessment {
        Assessment {
            confidence: UNPARSED_CONFIDENCE,
            needs_more_context: false,
            missing_aspects: Vec::new(),
            strict: true,
        }
    }
}

/// Question keywords that occur in no result text.
fn missing_aspects(results: &[SearchResult], question: &str) -> Vec<String> {
    let corpus: String = results
        .iter()
        .filter_map(SearchResult::text)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    keyword_tokens(question)
        .into_iter()
        .filter(|keyword| !corpus.contains(&keyword.to_lowercase()))
        .take(MAX_MISSING_ASPECTS)
        .collect()
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::stubs::{results, StubProvider};

    const LONG_ANSWER: &str =
        "Ein Bilanzkreis ist ein virtuelles Energiemengenkonto fuer Einspeisungen und Entnahmen.";

    fn validator() -> QualityValidator {
        QualityValidator::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_heuristic_bands() {
        let v = validator();
        assert_eq!(v.assess(&results("r", 7, 0.9), LONG_ANSWER, "q").confidence, 1.0);
        assert_eq!(v.assess(&results("r", 5, 0.9), LONG_ANSWER, "q").confidence, 1.0);
        assert_eq!(v.assess(&results("r", 4, 0.9), LONG_ANSWER, "q").confidence, 0.6);
        assert_eq!(v.assess(&results("r", 1, 0.9), LONG_ANSWER, "q").confidence, 0.4);
        assert_eq!(v.assess(&[], LONG_ANSWER, "q").confidence, 0.0);
    }

    #[test]
    fn test_needs_more_context_below_threshold() {
        let v = validator();
        assert!(!v.assess(&results("r", 3, 0.9), LONG_ANSWER, "q").needs_more_context);
        assert!(v.assess(&results("r", 2, 0.9), LONG_ANSWER, "q").needs_more_context);
    }

    #[test]
    fn test_short_answer_penalty() {
        let assessment = validator().assess(&results("r", 5, 0.9), "Ja.", "q");
        assert_eq!(assessment.confidence, 0.5);
        assert!(!assessment.needs_more_context);
    }

    #[test]
    fn test_missing_aspects_from_uncovered_keywords() {
        let input = vec![SearchResult::new("a", 0.9).with_text("Der Bilanzkreis wird taeglich abgerechnet.")];
        let assessment = validator().assess(
            &input,
            LONG_ANSWER,
            "Wie funktioniert Bilanzkreis Abrechnung und Regelenergie?",
        );
        assert_eq!(
            assessment.missing_aspects,
            vec!["funktioniert", "Abrechnung", "Regelenergie"]
        );
    }

    #[test]
    fn test_parse_assessment_with_surrounding_text() {
        let raw = "Sure! {\"confidence\": 0.35, \"needsMoreContext\": true, \"missingAspects\": [\"Fristen\", \" \"]} Done.";
        let assessment = validator().parse_assessment(raw).unwrap();
        assert_eq!(assessment.confidence, 0.35);
        assert!(assessment.needs_more_context);
        assert_eq!(assessment.missing_aspects, vec!["Fristen"]);
        assert!(assessment.strict);
    }

    #[test]
    fn test_parse_assessment_derives_needs_more_context() {
        let assessment = validator().parse_assessment(r#"{"confidence": 2.0}"#).unwrap();
        assert_eq!(assessment.confidence, 1.0);
        assert!(!assessment.needs_more_context);
    }

    #[test]
    fn test_parse_assessment_failures() {
        assert!(validator().parse_assessment("no json here").is_err());
        assert!(validator().parse_assessment(r#"{"score": 1}"#).is_err());
        assert!(validator().parse_assessment("} {").is_err());
    }

    #[tokio::test]
    async fn test_strict_unparseable_uses_conservative_default() {
        let provider = StubProvider::answering(LONG_ANSWER).with_text_handler(|_| Ok("not json".to_string()));
        let mut budget = ApiBudget::new(2);

        let (assessment, err) = validator()
            .assess_strict(
                &provider,
                &PromptSet::builtin(),
                "q",
                &[],
                &Context::empty(),
                LONG_ANSWER,
                &mut budget,
            )
            .await;

        assert_eq!(assessment, QualityValidator::conservative_default());
        assert!(matches!(err, Some(StageError::ValidationParseFailure(_))));
        assert_eq!(budget.used(), 1);
    }

    #[tokio::test]
    async fn test_strict_parsed_response() {
        let provider = StubProvider::answering(LONG_ANSWER).with_text_handler(|prompt| {
            assert!(prompt.contains("needsMoreContext"));
            Ok(r#"{"confidence": 0.2, "needsMoreContext": true, "missingAspects": ["Fristen"]}"#.to_string())
        });
        let mut budget = ApiBudget::new(2);

        let (assessment, err) = validator()
            .assess_strict(
                &provider,
                &PromptSet::builtin(),
                "q",
                &results("r", 5, 0.9),
                &Context::empty(),
                LONG_ANSWER,
                &mut budget,
            )
            .await;

        assert!(err.is_none());
        assert!(assessment.needs_more_context);
        assert_eq!(assessment.missing_aspects, vec!["Fristen"]);
    }

    #[tokio::test]
    async fn test_strict_without_budget_falls_back_to_heuristic() {
        let provider = StubProvider::answering(LONG_ANSWER);
        let mut budget = ApiBudget::new(0);

        let (assessment, err) = validator()
            .assess_strict(
                &provider,
                &PromptSet::builtin(),
                "q",
                &results("r", 5, 0.9),
                &Context::empty(),
                LONG_ANSWER,
                &mut budget,
            )
            .await;

        assert!(!assessment.strict);
        assert_eq!(assessment.confidence, 1.0);
        assert!(matches!(err, Some(StageError::BudgetExhausted { .. })));
        assert_eq!(provider.text_calls(), 0);
    }
}
