//! Qdrant search backend.
//!
//! Queries are embedded through Ollama's embeddings API and then matched
//! against a Qdrant collection over its REST API.
//! Qdrant API: https://api.qdrant.tech/api-reference/search/points

use crate::search::client::SearchClient;
use crate::types::SearchResult;
use reasoner_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Request timeout for embedding and search calls, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Request payload for the Ollama embeddings API
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from the Ollama embeddings API
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Turns query text into vectors via a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Search(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Failed to parse embedding: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(AppError::Search(format!(
                "Embedding model '{}' returned an empty vector",
                self.model
            )));
        }

        Ok(parsed.embedding)
    }
}

/// Qdrant points search request
#[derive(Debug, Serialize)]
struct PointsSearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

/// Qdrant points search response
#[derive(Debug, Deserialize)]
struct PointsSearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ScoredPoint {
    fn into_result(self) -> SearchResult {
        // Point ids are either unsigned integers or UUID strings
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        SearchResult {
            id,
            score: self.score,
            payload: self.payload.unwrap_or_default(),
        }
    }
}

/// Searches one Qdrant collection.
#[derive(Debug, Clone)]
pub struct QdrantSearchClient {
    client: Client,
    base_url: String,
    collection: String,
    embedder: Arc<OllamaEmbedder>,
}

impl QdrantSearchClient {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        embedder: Arc<OllamaEmbedder>,
    ) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            embedder,
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        )
    }
}

#[async_trait::async_trait]
impl SearchClient for QdrantSearchClient {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> AppResult<Vec<SearchResult>> {
        let vector = self.embedder.embed(query).await?;

        tracing::debug!(
            collection = %self.collection,
            dims = vector.len(),
            limit,
            "Searching Qdrant"
        );

        let response = self
            .client
            .post(self.search_url())
            .json(&PointsSearchRequest {
                vector: &vector,
                limit,
                score_threshold,
                with_payload: true,
            })
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Qdrant request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Search(format!(
                "Qdrant API error ({}) on '{}': {}",
                status, self.collection, body
            )));
        }

        let parsed: PointsSearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Failed to parse Qdrant response: {}", e)))?;

        Ok(parsed
            .result
            .into_iter()
            .map(ScoredPoint::into_result)
            .collect())
    }
}

fn http_client() -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Search(format!("Failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let embedder = Arc::new(OllamaEmbedder::new("http://localhost:11434", "nomic").unwrap());
        let client = QdrantSearchClient::new("http://qdrant:6333/", "docs", embedder).unwrap();
        assert_eq!(
            client.search_url(),
            "http://qdrant:6333/collections/docs/points/search"
        );
        assert_eq!(client.name(), "docs");
    }

    #[test]
    fn test_parse_points_response() {
        let raw = r#"{
            "result": [
                {"id": 42, "score": 0.91, "payload": {"text": "Bilanzkreis"}},
                {"id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "score": 0.55}
            ],
            "status": "ok",
            "time": 0.002
        }"#;
        let parsed: PointsSearchResponse = serde_json::from_str(raw).unwrap();
        let results: Vec<_> = parsed.result.into_iter().map(ScoredPoint::into_result).collect();

        assert_eq!(results[0].id, "42");
        assert_eq!(results[0].text(), Some("Bilanzkreis"));
        assert_eq!(results[1].id, "5c56c793-69f3-4fbf-87e6-c4bf54c28c26");
        assert!(results[1].payload.is_empty());
    }

    #[test]
    fn test_search_request_shape() {
        let vector = [0.1_f32, 0.2];
        let body = serde_json::to_value(PointsSearchRequest {
            vector: &vector,
            limit: 10,
            score_threshold: 0.3,
            with_payload: true,
        })
        .unwrap();
        assert_eq!(body["limit"], 10);
        assert_eq!(body["with_payload"], true);
        assert_eq!(body["vector"].as_array().unwrap().len(), 2);
    }
}
