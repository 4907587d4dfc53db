//! Wiring of an engine from application configuration.

use crate::provider::LlmGenerationProvider;
use crate::search::{MemorySearchClient, OllamaEmbedder, QdrantSearchClient, SearchClient};
use crate::ReasoningEngine;
use reasoner_core::{AppConfig, AppResult, SearchBackend};
use reasoner_llm::create_client;
use reasoner_prompt::PromptSet;
use std::sync::Arc;

/// Build the search clients for the configured backend.
///
/// The memory backend runs on an empty corpus when the corpus file does
/// not exist yet.
pub fn create_search_clients(config: &AppConfig) -> AppResult<Vec<Arc<dyn SearchClient>>> {
    match config.search.backend {
        SearchBackend::Memory => {
            let client = match config.corpus_path() {
                Some(path) if path.exists() => MemorySearchClient::from_file(&path)?,
                Some(path) => {
                    tracing::warn!("Corpus {:?} not found, searching an empty corpus", path);
                    MemorySearchClient::new("memory", Vec::new())
                }
                None => MemorySearchClient::new("memory", Vec::new()),
            };
            Ok(vec![Arc::new(client)])
        }
        SearchBackend::Qdrant => {
            let embedder = Arc::new(OllamaEmbedder::new(
                config.search.embedding_endpoint.as_str(),
                config.search.embedding_model.as_str(),
            )?);

            config
                .search
                .collections
                .iter()
                .map(|collection| {
                    let client = QdrantSearchClient::new(
                        config.search.qdrant_url.as_str(),
                        collection.as_str(),
                        embedder.clone(),
                    )?;
                    Ok(Arc::new(client) as Arc<dyn SearchClient>)
                })
                .collect()
        }
    }
}

/// Build a ready-to-run engine: search clients, LLM provider, prompts.
pub fn build_engine(config: &AppConfig) -> AppResult<ReasoningEngine> {
    config.validate()?;

    let prompts = Arc::new(PromptSet::load(Some(config.workspace.as_path()))?);
    let client = create_client(&config.provider, config.endpoint.as_deref())?;
    let provider = Arc::new(LlmGenerationProvider::new(
        client,
        config.model.as_str(),
        prompts.clone(),
    ));
    let clients = create_search_clients(config)?;

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        search_clients = clients.len(),
        "Engine assembled"
    );

    Ok(ReasoningEngine::new(clients, provider).with_prompts(prompts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Preferences;
    use crate::PipelineConfig;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        AppConfig {
            workspace: dir.path().to_path_buf(),
            provider: "mock".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_corpus_gives_empty_memory_client() {
        let dir = TempDir::new().unwrap();
        let clients = create_search_clients(&config_in(&dir)).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name(), "memory");
    }

    #[test]
    fn test_qdrant_client_per_collection() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.search.backend = SearchBackend::Qdrant;
        config.search.collections = vec!["regulation".to_string(), "faq".to_string()];

        let clients = create_search_clients(&config).unwrap();
        let names: Vec<_> = clients.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["regulation", "faq"]);
    }

    #[tokio::test]
    async fn test_build_engine_with_mock_provider_and_corpus() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join(".reasoner");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(
            state.join("corpus.json"),
            r#"[
                {"id": "bk-1", "title": "Bilanzkreis", "text": "Ein Bilanzkreis fasst Einspeise- und Entnahmestellen zusammen.", "topics": ["Bilanzierung"]},
                {"id": "bk-2", "text": "Der Bilanzkreisverantwortliche sorgt fuer einen ausgeglichenen Bilanzkreis."}
            ]"#,
        )
        .unwrap();

        let engine = build_engine(&config_in(&dir)).unwrap();
        let result = engine
            .run(
                "Was ist ein Bilanzkreis?",
                &[],
                &Preferences::default(),
                &PipelineConfig::default(),
            )
            .await
            .unwrap();

        assert!(!result.used_fallback);
        assert!(result.answer.starts_with("[mock answer]"));
        assert!(result.sources.contains(&"bk-1".to_string()));
        assert!(result.api_calls_used <= PipelineConfig::default().max_api_calls);
    }
}
