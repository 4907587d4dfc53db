//! Ask command handler.
//!
//! Runs one reasoning loop over the configured search backend and prints
//! the answer, optionally with its iteration trace.

use clap::Args;
use reasoner_core::{config::AppConfig, AppError, AppResult};
use reasoner_engine::{build_engine, load_config, Message, PipelineConfig, Preferences, RunResult};
use std::path::{Path, PathBuf};

/// Answer a question from the configured collections
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Earlier conversation as a JSON array of {"role", "content"} messages
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Language the answer should be written in
    #[arg(short, long)]
    pub language: Option<String>,

    /// Topics to favour when expanding queries (repeatable)
    #[arg(long = "focus")]
    pub focus_topics: Vec<String>,

    /// Never spend an API call on query expansion
    #[arg(long)]
    pub no_expand: bool,

    /// Override the iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Override the API call budget
    #[arg(long)]
    pub max_api_calls: Option<u32>,

    /// Grade answers with an extra model call
    #[arg(long)]
    pub strict: bool,

    /// Output the full run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the per-iteration step trace after the answer
    #[arg(long)]
    pub trace: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let history = match &self.history {
            Some(path) => read_history(path)?,
            None => Vec::new(),
        };

        let pipeline = self.pipeline_config(load_config(&config.workspace)?);
        let preferences = self.preferences();

        let engine = build_engine(config)?;
        let result = engine
            .run(&question, &history, &preferences, &pipeline)
            .await?;

        if self.json {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
            return Ok(());
        }

        println!("{}", result.answer);

        if self.trace {
            print_trace(&result);
        }

        if result.used_fallback {
            tracing::warn!(
                "Answer produced by fallback: {}",
                result.fallback_reason.as_deref().unwrap_or("unknown reason")
            );
        }

        tracing::debug!(
            "Run {} - {} iterations, {} API calls, confidence {:.2}, {} ms",
            result.run_id,
            result.iterations.len(),
            result.api_calls_used,
            result.final_confidence,
            result.total_duration_ms
        );

        Ok(())
    }

    /// Apply command-line overrides to the workspace pipeline config.
    fn pipeline_config(&self, mut pipeline: PipelineConfig) -> PipelineConfig {
        if let Some(max_iterations) = self.max_iterations {
            pipeline.max_iterations = max_iterations;
        }
        if let Some(max_api_calls) = self.max_api_calls {
            pipeline.max_api_calls = max_api_calls;
        }
        if self.strict {
            pipeline.use_strict_validation = true;
        }
        pipeline
    }

    fn preferences(&self) -> Preferences {
        Preferences {
            language: self.language.clone(),
            focus_topics: self.focus_topics.clone(),
            expand_queries: !self.no_expand,
        }
    }

    /// Get the question text from the argument or the file.
    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(question) = &self.question {
            return Ok(Some(question.clone()));
        }
        match &self.file {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?)),
            None => Ok(None),
        }
    }
}

fn read_history(path: &Path) -> AppResult<Vec<Message>> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| AppError::Config(format!("Invalid history file {:?}: {}", path, e)))
}

fn print_trace(result: &RunResult) {
    println!();
    for iteration in &result.iterations {
        println!(
            "Iteration {} - confidence {:.2}, {} ms{}",
            iteration.index + 1,
            iteration.confidence,
            iteration.duration_ms,
            if iteration.should_continue { ", refining" } else { "" }
        );
        for step in &iteration.step_trace {
            let status = if step.success { "ok" } else { "!!" };
            match &step.error {
                Some(error) => println!("  [{}] {:?} ({} ms): {}", status, step.name, step.duration_ms, error),
                None => println!("  [{}] {:?} ({} ms)", status, step.name, step.duration_ms),
            }
        }
    }
    println!(
        "{} API calls, {} sources{}",
        result.api_calls_used,
        result.sources.len(),
        if result.used_fallback { ", fallback used" } else { "" }
    );
}
