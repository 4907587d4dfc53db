//! Configuration management for Reasoner.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.reasoner/config.yaml)
//!
//! The configuration is workspace-centric, with most state stored in `.reasoner/`.
//! Pipeline tuning (iteration and API-call budgets) lives in the engine crate and
//! is read from `.reasoner/pipeline.yaml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".reasoner";

/// Main application configuration.
///
/// This struct holds all global configuration options that affect
/// CLI behavior across commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .reasoner/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Text generation provider (e.g., "ollama", "mock")
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// Optional provider endpoint override
    pub endpoint: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Vector search settings
    pub search: SearchSettings,
}

/// Which vector search backend answers queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// JSON corpus held in memory, scored by keyword overlap
    Memory,
    /// Qdrant collections queried over HTTP
    Qdrant,
}

/// Vector search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub backend: SearchBackend,

    /// Qdrant base URL
    #[serde(rename = "qdrantUrl")]
    pub qdrant_url: String,

    /// Collections searched in parallel for every query
    pub collections: Vec<String>,

    /// Embedding model used to vectorize queries
    #[serde(rename = "embeddingModel")]
    pub embedding_model: String,

    /// Embedding endpoint (Ollama API)
    #[serde(rename = "embeddingEndpoint")]
    pub embedding_endpoint: String,

    /// Corpus file for the memory backend (relative to the workspace)
    pub corpus: Option<PathBuf>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Memory,
            qdrant_url: "http://localhost:6333".to_string(),
            collections: vec!["knowledge".to_string()],
            embedding_model: "nomic-embed-text".to_string(),
            embedding_endpoint: "http://localhost:11434".to_string(),
            corpus: Some(PathBuf::from(STATE_DIR).join("corpus.json")),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    search: Option<SearchSection>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchSection {
    backend: Option<SearchBackend>,
    #[serde(rename = "qdrantUrl")]
    qdrant_url: Option<String>,
    collections: Option<Vec<String>>,
    #[serde(rename = "embeddingModel")]
    embedding_model: Option<String>,
    #[serde(rename = "embeddingEndpoint")]
    embedding_endpoint: Option<String>,
    corpus: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
            search: SearchSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `REASONER_WORKSPACE`: Override workspace path
    /// - `REASONER_CONFIG`: Path to config file
    /// - `REASONER_PROVIDER`: Generation provider
    /// - `REASONER_MODEL`: Model identifier
    /// - `REASONER_ENDPOINT`: Provider endpoint
    /// - `REASONER_QDRANT_URL`: Qdrant base URL
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use reasoner_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("REASONER_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("REASONER_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("REASONER_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("REASONER_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("REASONER_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }

        if let Ok(url) = std::env::var("REASONER_QDRANT_URL") {
            config.search.qdrant_url = url;
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
        }

        if let Some(search) = config_file.search {
            let target = &mut result.search;
            if let Some(backend) = search.backend {
                target.backend = backend;
            }
            if let Some(url) = search.qdrant_url {
                target.qdrant_url = url;
            }
            if let Some(collections) = search.collections {
                target.collections = collections;
            }
            if let Some(model) = search.embedding_model {
                target.embedding_model = model;
            }
            if let Some(endpoint) = search.embedding_endpoint {
                target.embedding_endpoint = endpoint;
            }
            if search.corpus.is_some() {
                target.corpus = search.corpus;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// This method merges command-line flags with the loaded configuration,
    /// giving precedence to CLI flags over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        json_logs: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if json_logs {
            self.json_logs = true;
        }

        self
    }

    /// Get the path to the .reasoner directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .reasoner directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Resolve the memory-backend corpus path against the workspace.
    pub fn corpus_path(&self) -> Option<PathBuf> {
        self.search.corpus.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.workspace.join(p)
            }
        })
    }

    /// Validate configuration for the active provider and search backend.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "mock"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        match self.search.backend {
            SearchBackend::Qdrant => {
                if self.search.collections.is_empty() {
                    return Err(AppError::Config(
                        "Qdrant backend requires at least one collection".to_string(),
                    ));
                }
            }
            SearchBackend::Memory => {
                if self.search.corpus.is_none() {
                    return Err(AppError::Config(
                        "Memory backend requires a corpus file".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
