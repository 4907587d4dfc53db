//! Built-in prompt definitions.
//!
//! Used whenever the workspace does not override a prompt with its own
//! `.reasoner/prompts/<id>.yml` file.

use crate::types::{PromptDefinition, PromptOutputSpec};

/// Prompt that expands a question into extra search terms.
pub const QUERY_EXPANSION: &str = "query_expansion";

/// Prompt for a full, exhaustive answer.
pub const ANSWER: &str = "answer";

/// Prompt for a short answer when the retrieved context is already strong.
pub const ANSWER_FAST: &str = "answer_fast";

/// Prompt that grades an answer against its retrieved context.
pub const VALIDATION: &str = "validation";

/// All prompt ids the engine requires.
pub const REQUIRED_PROMPTS: [&str; 4] = [QUERY_EXPANSION, ANSWER, ANSWER_FAST, VALIDATION];

/// Look up the compiled-in definition for a prompt id.
pub fn builtin(id: &str) -> Option<PromptDefinition> {
    let (title, system, template, format, max_tokens, temperature) = match id {
        QUERY_EXPANSION => (
            "Search query expansion",
            None,
            "Generate {{count}} short, distinct search terms that would help find \
             reference material for the question below.\n\
             {{#if focus}}Prefer terms related to: {{focus}}\n{{/if}}\
             Respond with a JSON array of strings only, for example [\"term one\", \"term two\"].\n\n\
             Question: {{question}}",
            "json",
            200,
            0.2,
        ),
        ANSWER => (
            "Grounded answer",
            Some(
                "You are a knowledge assistant with access to a curated document collection.\n\
                 Answer only from the reference material. If it does not contain the answer, say so.\n\
                 {{#if language}}Answer in {{language}}.\n{{/if}}",
            ),
            "{{#if history}}Conversation so far:\n{{history}}\n\n{{/if}}\
             Question:\n{{question}}\n\n\
             Reference material{{#if topics}} (topics: {{topics}}){{/if}}:\n{{context}}\n\n\
             Give a complete, well-structured answer.",
            "markdown",
            1200,
            0.3,
        ),
        ANSWER_FAST => (
            "Concise grounded answer",
            Some(
                "You are a knowledge assistant. Answer briefly and only from the reference material.\n\
                 {{#if language}}Answer in {{language}}.\n{{/if}}",
            ),
            "{{#if history}}Conversation so far:\n{{history}}\n\n{{/if}}\
             Question:\n{{question}}\n\n\
             Reference material:\n{{context}}\n\n\
             Answer concisely.",
            "markdown",
            500,
            0.2,
        ),
        VALIDATION => (
            "Answer quality assessment",
            None,
            "Assess whether the answer below is fully supported by the reference material \
             and covers every part of the question.\n\n\
             Question: {{question}}\n\nAnswer:\n{{answer}}\n\n\
             Reference material ({{result_count}} passages):\n{{context}}\n\n\
             Respond with JSON only: \
             {\"confidence\": <0..1>, \"needsMoreContext\": <true|false>, \"missingAspects\": [\"...\"]}",
            "json",
            200,
            0.0,
        ),
        _ => return None,
    };

    Some(PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        system: system.map(str::to_string),
        template: template.to_string(),
        output: PromptOutputSpec {
            format: format.to_string(),
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_required_prompt_has_builtin() {
        for id in REQUIRED_PROMPTS {
            let def = builtin(id).unwrap();
            assert_eq!(def.id, id);
            assert!(!def.template.is_empty());
        }
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(builtin("nope").is_none());
    }
}
