//! Scriptable search clients and generation providers for engine tests.

use crate::provider::GenerationProvider;
use crate::search::SearchClient;
use crate::types::{Context, Message, Preferences, SearchResult};
use reasoner_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// `n` results with ids `{prefix}-{i}`, scores falling from `top_score`.
pub fn results(prefix: &str, n: usize, top_score: f32) -> Vec<SearchResult> {
    (0..n)
        .map(|i| {
            SearchResult::new(format!("{}-{}", prefix, i), top_score - i as f32 * 0.01)
                .with_text(format!("Passage {} from {} about Bilanzkreis", i, prefix))
        })
        .collect()
}

/// Answers known queries from a fixed table; unknown queries get the default.
pub struct MapSearchClient {
    name: String,
    answers: HashMap<String, Vec<SearchResult>>,
    default: Vec<SearchResult>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MapSearchClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answers: HashMap::new(),
            default: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.answers.insert(query.to_string(), results);
        self
    }

    /// Results for every query not in the table.
    pub fn with_default(mut self, results: Vec<SearchResult>) -> Self {
        self.default = results;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchClient for MapSearchClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> AppResult<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let results = self.answers.get(query).unwrap_or(&self.default);
        Ok(results
            .iter()
            .filter(|r| r.score >= score_threshold)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Always fails.
pub struct FailingSearchClient;

#[async_trait::async_trait]
impl SearchClient for FailingSearchClient {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _query: &str, _limit: usize, _threshold: f32) -> AppResult<Vec<SearchResult>> {
        Err(AppError::Search("connection refused".to_string()))
    }
}

/// Sleeps before returning nothing.
pub struct SlowSearchClient {
    delay: Duration,
}

impl SlowSearchClient {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl SearchClient for SlowSearchClient {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, _query: &str, _limit: usize, _threshold: f32) -> AppResult<Vec<SearchResult>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

type TextHandler = Box<dyn Fn(&str) -> AppResult<String> + Send + Sync>;

/// Generation provider with a fixed answer and a scriptable text handler.
pub struct StubProvider {
    answer: Option<String>,
    text_handler: TextHandler,
    delay: Option<Duration>,
    answer_limit: Option<usize>,
    text_calls: AtomicUsize,
    response_calls: AtomicUsize,
    fast_path_calls: AtomicUsize,
}

impl StubProvider {
    /// Answers every question with `answer`.
    ///
    /// Expansion prompts get two extra terms; validation prompts get a
    /// confident verdict.
    pub fn answering(answer: &str) -> Self {
        Self::build(Some(answer.to_string()), Box::new(default_text_response))
    }

    /// Fails every call.
    pub fn failing() -> Self {
        Self::build(
            None,
            Box::new(|_| Err(AppError::Llm("provider offline".to_string()))),
        )
    }

    fn build(answer: Option<String>, text_handler: TextHandler) -> Self {
        Self {
            answer,
            text_handler,
            delay: None,
            answer_limit: None,
            text_calls: AtomicUsize::new(0),
            response_calls: AtomicUsize::new(0),
            fast_path_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_text_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> AppResult<String> + Send + Sync + 'static,
    {
        self.text_handler = Box::new(handler);
        self
    }

    /// Delay every answer call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer only the first `n` questions, then fail.
    pub fn answering_only(mut self, n: usize) -> Self {
        self.answer_limit = Some(n);
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn response_calls(&self) -> usize {
        self.response_calls.load(Ordering::SeqCst)
    }

    pub fn fast_path_calls(&self) -> usize {
        self.fast_path_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.text_calls() + self.response_calls()
    }
}

fn default_text_response(prompt: &str) -> AppResult<String> {
    if prompt.contains("JSON array") {
        Ok(r#"["Regelenergie", "Bilanzkreisvertrag"]"#.to_string())
    } else {
        Ok(r#"{"confidence": 0.9, "needsMoreContext": false, "missingAspects": []}"#.to_string())
    }
}

#[async_trait::async_trait]
impl GenerationProvider for StubProvider {
    async fn generate_text(&self, prompt: &str) -> AppResult<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        (self.text_handler)(prompt)
    }

    async fn generate_response(
        &self,
        _history: &[Message],
        _context: &Context,
        _preferences: &Preferences,
        fast_path: bool,
    ) -> AppResult<String> {
        let earlier = self.response_calls.fetch_add(1, Ordering::SeqCst);
        if fast_path {
            self.fast_path_calls.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.answer_limit.is_some_and(|limit| earlier >= limit) {
            return Err(AppError::Llm("provider offline".to_string()));
        }
        self.answer
            .clone()
            .ok_or_else(|| AppError::Llm("provider offline".to_string()))
    }
}
