//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use reasoner_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Renders both the system template (if any) and the user template with the
/// same variables, and carries the definition's output settings along.
///
/// # Example
/// ```no_run
/// use reasoner_prompt::{build_prompt, PromptSet};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompts = PromptSet::builtin();
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "Was ist ein Bilanzkreis?".to_string());
///
/// let built = build_prompt(prompts.get("answer")?, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, variables))
        .transpose()?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        source_prompt_id: definition.id.clone(),
        output: definition.output.clone(),
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PromptSet;
    use crate::types::PromptOutputSpec;

    fn create_test_definition(system: Option<&str>) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            system: system.map(str::to_string),
            template: "Question: {{question}}".to_string(),
            output: PromptOutputSpec {
                format: "markdown".to_string(),
                max_tokens: Some(100),
                temperature: None,
            },
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "<b>&</b>".to_string());

        let rendered = render_template("Q: {{question}}", &vars).unwrap();
        assert_eq!(rendered, "Q: <b>&</b>");
    }

    #[test]
    fn test_build_prompt_with_system() {
        let def = create_test_definition(Some("Answer in {{language}}."));
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Test question".to_string());
        vars.insert("language".to_string(), "German".to_string());

        let built = build_prompt(&def, &vars).unwrap();
        assert_eq!(built.user, "Question: Test question");
        assert_eq!(built.system.as_deref(), Some("Answer in German."));
        assert_eq!(built.source_prompt_id, "test.prompt");
        assert_eq!(built.output.max_tokens, Some(100));
    }

    #[test]
    fn test_blank_system_dropped() {
        let def = create_test_definition(Some("{{#if language}}x{{/if}}"));
        let built = build_prompt(&def, &HashMap::new()).unwrap();
        assert!(built.system.is_none());
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        // Handlebars renders missing variables as empty string
        assert_eq!(render_template("Q: {{missing}}", &vars).unwrap(), "Q: ");
    }

    #[test]
    fn test_builtin_expansion_prompt_renders() {
        let prompts = PromptSet::builtin();
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Was ist ein Bilanzkreis?".to_string());
        vars.insert("count".to_string(), "3".to_string());

        let built = build_prompt(prompts.get("query_expansion").unwrap(), &vars).unwrap();
        assert!(built.user.contains("Generate 3"));
        assert!(built.user.contains("JSON array"));
        assert!(built.user.contains("Bilanzkreis"));
        assert!(!built.user.contains("Prefer terms"));
    }
}
