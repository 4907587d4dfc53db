//! Prompt loader for YAML prompt definitions.

use crate::defaults::{self, REQUIRED_PROMPTS};
use crate::types::PromptDefinition;
use reasoner_core::config::STATE_DIR;
use reasoner_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Load a prompt definition by ID from the workspace.
///
/// This function looks for a prompt file named `<id>.yml` in the
/// `.reasoner/prompts/` directory.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.reasoner/`
/// * `prompt_id` - Prompt identifier (e.g., "answer")
///
/// # Returns
/// A parsed `PromptDefinition` or an error if not found/invalid.
///
/// # Example
/// ```no_run
/// use reasoner_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List all prompt IDs overridden in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

/// The complete set of prompts used by one engine instance.
///
/// Workspace files override the built-in defaults one prompt at a time.
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptSet {
    /// Built-in prompts only.
    pub fn builtin() -> Self {
        let prompts = REQUIRED_PROMPTS
            .iter()
            .filter_map(|id| defaults::builtin(id))
            .map(|def| (def.id.clone(), def))
            .collect();
        Self { prompts }
    }

    /// Built-in prompts overlaid with any workspace overrides.
    ///
    /// A present but invalid override is an error; a missing one is not.
    pub fn load(workspace_path: Option<&Path>) -> AppResult<Self> {
        let mut set = Self::builtin();

        let Some(workspace) = workspace_path else {
            return Ok(set);
        };

        for id in list_prompts(workspace)? {
            if !REQUIRED_PROMPTS.contains(&id.as_str()) {
                tracing::warn!("Ignoring unknown prompt override: {}", id);
                continue;
            }
            let def = load_prompt(workspace, &id)?;
            set.prompts.insert(id, def);
        }

        Ok(set)
    }

    /// Get a prompt by id.
    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt id: {}", id)))
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}
