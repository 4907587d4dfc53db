//! Config command handler.
//!
//! Shows the effective application and pipeline configuration.

use clap::Args;
use reasoner_core::{config::AppConfig, AppResult, SearchSettings};
use reasoner_engine::config::{get_config_path, load_config, save_config};
use reasoner_engine::PipelineConfig;
use serde::Serialize;

/// Show the effective configuration
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Write the default pipeline config to the workspace if none exists
    #[arg(long)]
    pub init: bool,

    /// Output as JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    provider: &'a str,
    model: &'a str,
    endpoint: Option<&'a str>,
    search: &'a SearchSettings,
    pipeline: &'a PipelineConfig,
}

impl ConfigCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing config command");

        if self.init {
            let path = get_config_path(&config.workspace);
            if path.exists() {
                tracing::info!("Pipeline config already exists at {:?}", path);
            } else {
                save_config(&config.workspace, &PipelineConfig::default())?;
                tracing::info!("Wrote default pipeline config to {:?}", path);
            }
        }

        let pipeline = load_config(&config.workspace)?;
        let effective = EffectiveConfig {
            provider: &config.provider,
            model: &config.model,
            endpoint: config.endpoint.as_deref(),
            search: &config.search,
            pipeline: &pipeline,
        };

        let rendered = if self.json {
            serde_json::to_string_pretty(&effective)?
        } else {
            serde_yaml::to_string(&effective)?
        };
        println!("{}", rendered.trim_end());

        Ok(())
    }
}
