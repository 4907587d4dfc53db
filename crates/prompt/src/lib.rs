//! Prompt system for Reasoner.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions (`.reasoner/prompts/<id>.yml`)
//! - Compiled-in defaults for every prompt the engine needs
//! - Handlebars template rendering

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt, PromptSet};
pub use types::{BuiltPrompt, PromptDefinition, PromptOutputSpec};
