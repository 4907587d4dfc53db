//! Domain types for the reasoning engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::StageError;

/// Payload keys that may carry a passage's text, in lookup order.
const TEXT_KEYS: [&str; 3] = ["text", "content", "page_content"];

/// Payload keys that may carry topic metadata.
const TOPIC_KEYS: [&str; 3] = ["topic", "topics", "category"];

/// A single search query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A scored candidate passage returned by a search client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identity of the passage; unique within one merged result list
    pub id: String,

    /// Similarity score (higher is more relevant)
    pub score: f32,

    /// Arbitrary provider payload (text, metadata)
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl SearchResult {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            payload: serde_json::Map::new(),
        }
    }

    /// Attach the passage text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.payload
            .insert("text".to_string(), serde_json::Value::String(text.into()));
        self
    }

    /// Attach a topic label.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.payload
            .insert("topic".to_string(), serde_json::Value::String(topic.into()));
        self
    }

    /// The textual content of the passage, if the payload carries one.
    pub fn text(&self) -> Option<&str> {
        TEXT_KEYS
            .iter()
            .filter_map(|key| self.payload.get(*key))
            .find_map(|value| value.as_str())
            .filter(|text| !text.trim().is_empty())
    }

    /// Topic labels found in the payload metadata.
    pub fn topics(&self) -> Vec<String> {
        let mut topics = Vec::new();
        for key in TOPIC_KEYS {
            match self.payload.get(key) {
                Some(serde_json::Value::String(topic)) => topics.push(topic.trim().to_string()),
                Some(serde_json::Value::Array(items)) => topics.extend(
                    items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .map(|topic| topic.trim().to_string()),
                ),
                _ => {}
            }
        }
        topics.retain(|topic| !topic.is_empty());
        topics
    }
}

/// Bounded textual context synthesized from search results for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub text: String,
    pub topics: BTreeSet<String>,
    /// Estimated sufficiency of the retrieved material, in [0, 1]
    pub quality_score: f32,
    /// Number of results whose text made it into `text`
    pub included: usize,
    /// Number of results the context was built from
    pub source_count: usize,
}

impl Context {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            topics: BTreeSet::new(),
            quality_score: 0.0,
            included: 0,
            source_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Optional user hints that shape planning and answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Language the answer should be written in
    pub language: Option<String>,

    /// Topics to favour when expanding search queries
    pub focus_topics: Vec<String>,

    /// Allow the planner to spend a generation call on query expansion
    pub expand_queries: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: None,
            focus_topics: Vec::new(),
            expand_queries: true,
        }
    }
}

/// Pipeline stage a step record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    QuickSearch,
    Planning,
    ExpandedSearch,
    Synthesis,
    Generation,
    Validation,
    FallbackSearch,
    FallbackGeneration,
}

/// Structured output of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Search {
        queries: Vec<String>,
        #[serde(rename = "resultCount")]
        result_count: usize,
        #[serde(rename = "failedCalls")]
        failed_calls: usize,
    },
    Plan {
        queries: Vec<String>,
        expanded: bool,
    },
    Synthesis {
        #[serde(rename = "contextChars")]
        context_chars: usize,
        included: usize,
        topics: Vec<String>,
        #[serde(rename = "qualityScore")]
        quality_score: f32,
    },
    Generation {
        #[serde(rename = "answerChars")]
        answer_chars: usize,
        #[serde(rename = "fastPath")]
        fast_path: bool,
        /// True when no context existed and a fixed answer was used
        #[serde(rename = "noContext")]
        no_context: bool,
    },
    Validation {
        confidence: f32,
        #[serde(rename = "needsMoreContext")]
        needs_more_context: bool,
        #[serde(rename = "missingAspects")]
        missing_aspects: Vec<String>,
        strict: bool,
    },
    None,
}

/// Record of one pipeline stage invocation within an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: StepKind,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: StepOutput,
}

impl StepRecord {
    /// Build a record for a stage that started at `started`.
    ///
    /// A record carrying an error is unsuccessful even when the stage
    /// degraded gracefully and produced output.
    pub fn new(
        name: StepKind,
        started: Instant,
        error: Option<&StageError>,
        output: StepOutput,
    ) -> Self {
        Self {
            name,
            duration_ms: millis(started.elapsed()),
            success: error.is_none(),
            error: error.map(ToString::to_string),
            output,
        }
    }
}

/// One completed pass of the reasoning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub confidence: f32,
    pub step_trace: Vec<StepRecord>,
    pub should_continue: bool,
}

/// An iteration still being recorded.
#[derive(Debug)]
pub(crate) struct IterationTrace {
    index: u32,
    started_at: DateTime<Utc>,
    started: Instant,
    steps: Vec<StepRecord>,
}

impl IterationTrace {
    pub(crate) fn start(index: u32) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            started: Instant::now(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub(crate) fn finish(self, confidence: f32, should_continue: bool) -> Iteration {
        Iteration {
            index: self.index,
            started_at: self.started_at,
            duration_ms: millis(self.started.elapsed()),
            confidence,
            step_trace: self.steps,
            should_continue,
        }
    }
}

/// Final outcome of one reasoning run, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: Uuid,
    pub answer: String,
    pub iterations: Vec<Iteration>,
    pub final_confidence: f32,
    pub api_calls_used: u32,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Ids of the search results the final answer was generated from
    pub sources: Vec<String>,
    pub total_duration_ms: u64,
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
