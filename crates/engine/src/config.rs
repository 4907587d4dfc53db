//! Pipeline configuration management.
//!
//! Loads from `.reasoner/pipeline.yaml` if it exists, otherwise uses defaults.
//! Every key is optional; missing keys keep their default value.

use reasoner_core::config::STATE_DIR;
use reasoner_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning knobs for one reasoning run.
///
/// Read-only for the duration of a run. The ratio-based heuristics
/// (`target_result_count`, `confidence_full_results`, the quick-path
/// thresholds) are empirical defaults, not derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Hard cap on loop passes
    pub max_iterations: u32,

    /// Hard cap on combined planner/generator/validator calls
    pub max_api_calls: u32,

    /// Cap on search queries per planning pass (original included)
    pub max_queries: usize,

    /// Confidence below which another iteration is attempted
    pub quality_threshold: f32,

    /// Results requested per individual search call
    pub search_limit: usize,

    /// Minimum similarity score accepted from search clients
    pub score_threshold: f32,

    /// Context character budget
    pub context_max_chars: usize,

    /// Grade answers with an extra generation call instead of heuristics
    pub use_strict_validation: bool,

    /// Cap on merged results per coordinator call
    pub result_cap: usize,

    /// Result count at which context quality reaches 1.0
    pub target_result_count: usize,

    /// Context quality the quick path must exceed to skip expansion
    pub quick_path_quality: f32,

    /// Result count that lets the quick path skip expansion regardless of quality
    pub quick_path_min_results: usize,

    /// Result count at which heuristic confidence saturates
    pub confidence_full_results: usize,

    /// Answers shorter than this lose half their heuristic confidence
    pub min_answer_chars: usize,

    /// Timeout for each individual search call
    pub search_timeout_ms: u64,

    /// Overall deadline for the reasoning loop
    pub run_deadline_ms: u64,

    /// Timeout for the fallback generation call
    pub fallback_timeout_ms: u64,

    /// Answer used when even the fallback cannot generate one
    pub fallback_message: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            max_api_calls: 10,
            max_queries: 4,
            quality_threshold: 0.5,
            search_limit: 10,
            score_threshold: 0.3,
            context_max_chars: 4000,
            use_strict_validation: false,
            result_cap: 20,
            target_result_count: 10,
            quick_path_quality: 0.5,
            quick_path_min_results: 5,
            confidence_full_results: 5,
            min_answer_chars: 40,
            search_timeout_ms: 5_000,
            run_deadline_ms: 60_000,
            fallback_timeout_ms: 30_000,
            fallback_message: "Sorry, I could not answer this question right now. \
                               Please try again later or rephrase your question."
                .to_string(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would make a run meaningless or unbounded.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_iterations == 0 {
            return Err(invalid("maxIterations must be at least 1"));
        }
        if self.max_api_calls == 0 {
            return Err(invalid("maxApiCalls must be at least 1"));
        }
        if self.max_queries == 0 {
            return Err(invalid("maxQueries must be at least 1"));
        }
        if self.search_limit == 0 || self.result_cap == 0 {
            return Err(invalid("searchLimit and resultCap must be at least 1"));
        }
        if self.context_max_chars == 0 {
            return Err(invalid("contextMaxChars must be at least 1"));
        }
        if self.target_result_count == 0 || self.confidence_full_results == 0 {
            return Err(invalid(
                "targetResultCount and confidenceFullResults must be at least 1",
            ));
        }
        for (name, value) in [
            ("qualityThreshold", self.quality_threshold),
            ("quickPathQuality", self.quick_path_quality),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{} must be within [0, 1]", name)));
            }
        }
        if !self.score_threshold.is_finite() {
            return Err(invalid("scoreThreshold must be a finite number"));
        }
        if self.search_timeout_ms == 0 || self.run_deadline_ms == 0 {
            return Err(invalid("timeouts must be greater than zero"));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_millis(self.run_deadline_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::Config(format!("Invalid pipeline config: {}", msg))
}

/// Get the path to the pipeline config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("pipeline.yaml")
}

/// Load the pipeline configuration for a workspace.
///
/// Loads from `.reasoner/pipeline.yaml` if it exists, otherwise returns
/// the defaults. The result is validated either way.
pub fn load_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded pipeline config from {:?}", config_path);
        config
    } else {
        tracing::debug!("Using default pipeline config (no config file found)");
        PipelineConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save the pipeline configuration for a workspace.
pub fn save_config(workspace: &Path, config: &PipelineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved pipeline config to {:?}", config_path);
    Ok(())
}
