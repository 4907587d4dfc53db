//! In-memory search backend over a JSON corpus.
//!
//! Scores documents by keyword overlap with the query. Not semantic, but
//! deterministic and dependency-free, which makes it suitable for offline
//! use and for tests.

use crate::search::client::SearchClient;
use crate::text::keyword_tokens;
use crate::types::SearchResult;
use reasoner_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A document in the corpus file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Keyword-overlap search over documents held in memory.
#[derive(Debug, Clone)]
pub struct MemorySearchClient {
    name: String,
    documents: Vec<IndexedDocument>,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    doc: CorpusDocument,
    terms: HashSet<String>,
}

impl MemorySearchClient {
    /// Build a client over the given documents.
    pub fn new(name: impl Into<String>, documents: Vec<CorpusDocument>) -> Self {
        let documents = documents
            .into_iter()
            .map(|doc| {
                let searchable = match &doc.title {
                    Some(title) => format!("{} {}", title, doc.text),
                    None => doc.text.clone(),
                };
                let terms = keyword_tokens(&searchable)
                    .into_iter()
                    .map(|t| t.to_lowercase())
                    .collect();
                IndexedDocument { doc, terms }
            })
            .collect();

        Self {
            name: name.into(),
            documents,
        }
    }

    /// Load a corpus from a JSON file containing an array of documents.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Search(format!("Failed to read corpus {:?}: {}", path, e))
        })?;

        let documents: Vec<CorpusDocument> = serde_json::from_str(&content).map_err(|e| {
            AppError::Search(format!("Failed to parse corpus {:?}: {}", path, e))
        })?;

        tracing::info!("Loaded {} corpus documents from {:?}", documents.len(), path);

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("memory")
            .to_string();

        Ok(Self::new(name, documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Fraction of query keywords present in the document.
    fn score(query_terms: &[String], doc: &IndexedDocument) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let hits = query_terms.iter().filter(|t| doc.terms.contains(*t)).count();
        hits as f32 / query_terms.len() as f32
    }

    fn to_result(doc: &CorpusDocument, score: f32) -> SearchResult {
        let mut result = SearchResult::new(doc.id.clone(), score).with_text(doc.text.clone());
        if let Some(title) = &doc.title {
            result
                .payload
                .insert("title".to_string(), serde_json::Value::String(title.clone()));
        }
        if !doc.topics.is_empty() {
            result.payload.insert(
                "topics".to_string(),
                serde_json::Value::from(doc.topics.clone()),
            );
        }
        result
    }
}

#[async_trait::async_trait]
impl SearchClient for MemorySearchClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> AppResult<Vec<SearchResult>> {
        let query_terms: Vec<String> = keyword_tokens(query)
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let mut scored: Vec<(f32, &CorpusDocument)> = self
            .documents
            .iter()
            .map(|doc| (Self::score(&query_terms, doc), &doc.doc))
            .filter(|(score, _)| *score > 0.0 && *score >= score_threshold)
            .collect();

        // Stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, doc)| Self::to_result(doc, score))
            .collect())
    }
}
