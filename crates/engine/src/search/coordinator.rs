//! Concurrent multi-query search with deterministic merging.
//!
//! Every (query, client) pair becomes one search call. All calls run
//! concurrently, each under its own timeout; a failed or timed-out call
//! contributes nothing instead of aborting the whole search. Results are
//! merged only after every call has finished.

use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::search::client::SearchClient;
use crate::types::{Query, SearchResult};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Merged output of one coordinator call.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Deduplicated results, highest score first
    pub results: Vec<SearchResult>,

    /// Number of individual search calls issued
    pub calls: usize,

    /// Number of calls that failed or timed out
    pub failed_calls: usize,

    /// Error messages of failed calls, in call order
    pub errors: Vec<String>,
}

impl SearchOutcome {
    /// The non-fatal error to record when some calls failed.
    pub fn partial_failure(&self) -> Option<StageError> {
        (self.failed_calls > 0).then_some(StageError::SearchPartialFailure {
            failed: self.failed_calls,
            total: self.calls,
        })
    }
}

/// Fans search calls out over all registered clients.
#[derive(Clone)]
pub struct SearchCoordinator {
    clients: Vec<Arc<dyn SearchClient>>,
}

impl SearchCoordinator {
    pub fn new(clients: Vec<Arc<dyn SearchClient>>) -> Self {
        Self { clients }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Run every query against every client concurrently and merge.
    ///
    /// Queries are expected most relevant first: when two results share an
    /// id and a score, the one from the earlier query wins.
    pub async fn search(
        &self,
        queries: &[Query],
        per_query_limit: usize,
        config: &PipelineConfig,
    ) -> SearchOutcome {
        let timeout = config.search_timeout();

        let calls = queries.iter().flat_map(|query| {
            self.clients.iter().map(move |client| {
                search_one(
                    client.as_ref(),
                    &query.text,
                    per_query_limit,
                    config.score_threshold,
                    timeout,
                )
            })
        });

        let responses = join_all(calls).await;

        let mut outcome = SearchOutcome {
            calls: responses.len(),
            ..Default::default()
        };

        let mut batches = Vec::with_capacity(responses.len());
        for response in responses {
            match response {
                Ok(results) => batches.push(results),
                Err(message) => {
                    outcome.failed_calls += 1;
                    outcome.errors.push(message);
                }
            }
        }

        outcome.results = merge_results(batches, config.score_threshold, config.result_cap);

        tracing::debug!(
            queries = queries.len(),
            calls = outcome.calls,
            failed = outcome.failed_calls,
            results = outcome.results.len(),
            "Search fan-in complete"
        );

        outcome
    }
}

/// One bounded search call; failures become an error message.
async fn search_one(
    client: &dyn SearchClient,
    query: &str,
    limit: usize,
    score_threshold: f32,
    timeout: Duration,
) -> Result<Vec<SearchResult>, String> {
    match tokio::time::timeout(timeout, client.search(query, limit, score_threshold)).await {
        Ok(Ok(results)) => Ok(results),
        Ok(Err(e)) => {
            tracing::warn!("Search on '{}' failed: {}", client.name(), e);
            Err(format!("{}: {}", client.name(), e))
        }
        Err(_) => {
            tracing::warn!(
                "Search on '{}' timed out after {} ms",
                client.name(),
                timeout.as_millis()
            );
            Err(format!(
                "{}: timed out after {} ms",
                client.name(),
                timeout.as_millis()
            ))
        }
    }
}

/// Merge result batches into one deduplicated, score-sorted list.
///
/// Batches are flattened in the given order, results below `score_floor`
/// (or with a non-finite score) are dropped, the rest are stable-sorted by
/// descending score, the first occurrence of every id is kept, and the list
/// is cut to `cap`. The output depends only on the input order, never on
/// call completion order.
pub fn merge_results<I>(batches: I, score_floor: f32, cap: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    let mut flat: Vec<SearchResult> = batches
        .into_iter()
        .flatten()
        .filter(|r| r.score.is_finite() && r.score >= score_floor)
        .collect();

    flat.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    flat.retain(|r| seen.insert(r.id.clone()));
    flat.truncate(cap);
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::stubs::{results, FailingSearchClient, MapSearchClient, SlowSearchClient};

    fn config() -> PipelineConfig {
        PipelineConfig {
            search_timeout_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_dedupes_keeping_highest_score() {
        let merged = merge_results(
            vec![
                vec![SearchResult::new("a", 0.5), SearchResult::new("b", 0.9)],
                vec![SearchResult::new("a", 0.8), SearchResult::new("c", 0.7)],
            ],
            0.3,
            20,
        );
        let ids: Vec<_> = merged.iter().map(|r| (r.id.as_str(), r.score)).collect();
        assert_eq!(ids, vec![("b", 0.9), ("a", 0.8), ("c", 0.7)]);
    }

    #[test]
    fn test_merge_tie_goes_to_earlier_batch() {
        let first = SearchResult::new("x", 0.6).with_text("from first query");
        let second = SearchResult::new("x", 0.6).with_text("from second query");
        let merged = merge_results(vec![vec![first], vec![second]], 0.0, 20);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text(), Some("from first query"));
    }

    #[test]
    fn test_merge_applies_floor_and_cap() {
        let batch: Vec<_> = (0..30)
            .map(|i| SearchResult::new(format!("r{}", i), 0.2 + i as f32 * 0.02))
            .chain(std::iter::once(SearchResult::new("nan", f32::NAN)))
            .collect();
        let merged = merge_results(vec![batch], 0.3, 20);
        assert_eq!(merged.len(), 20);
        assert!(merged.iter().all(|r| r.score >= 0.3));
        assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_fan_out_over_queries_and_clients() {
        let left = MapSearchClient::new("left").with("q1", results("l", 3, 0.9));
        let right = MapSearchClient::new("right").with("q2", results("r", 2, 0.8));
        let coordinator = SearchCoordinator::new(vec![Arc::new(left), Arc::new(right)]);

        let outcome = coordinator
            .search(&[Query::new("q1"), Query::new("q2")], 10, &config())
            .await;

        assert_eq!(outcome.calls, 4);
        assert_eq!(outcome.failed_calls, 0);
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.partial_failure().is_none());
    }

    #[tokio::test]
    async fn test_failed_and_slow_calls_contribute_nothing() {
        let good = MapSearchClient::new("good").with("q", results("g", 4, 0.9));
        let coordinator = SearchCoordinator::new(vec![
            Arc::new(good),
            Arc::new(FailingSearchClient),
            Arc::new(SlowSearchClient::new(Duration::from_secs(5))),
        ]);

        let outcome = coordinator.search(&[Query::new("q")], 10, &config()).await;

        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.failed_calls, 2);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().any(|e| e.contains("timed out")));
        assert_eq!(
            outcome.partial_failure(),
            Some(StageError::SearchPartialFailure { failed: 2, total: 3 })
        );
    }

    #[tokio::test]
    async fn test_merge_is_deterministic_across_runs() {
        let a = MapSearchClient::new("a").with("q", results("shared", 5, 0.7));
        let b = MapSearchClient::new("b")
            .with("q", results("shared", 5, 0.7))
            .with_delay(Duration::from_millis(5));
        let coordinator = SearchCoordinator::new(vec![Arc::new(b), Arc::new(a)]);

        let first = coordinator.search(&[Query::new("q")], 10, &config()).await;
        for _ in 0..5 {
            let again = coordinator.search(&[Query::new("q")], 10, &config()).await;
            assert_eq!(again.results, first.results);
        }
    }

    #[tokio::test]
    async fn test_bilanzkreis_scenario() {
        // Three collections answering 6, 0 and 4 passages above threshold
        let question = "Was ist ein Bilanzkreis?";
        let coordinator = SearchCoordinator::new(vec![
            Arc::new(MapSearchClient::new("regulation").with(question, results("reg", 6, 0.85))),
            Arc::new(MapSearchClient::new("faq")),
            Arc::new(MapSearchClient::new("glossary").with(question, results("glo", 4, 0.75))),
        ]);

        let outcome = coordinator
            .search(&[Query::new(question)], 10, &PipelineConfig::default())
            .await;

        assert_eq!(outcome.results.len(), 10);
        assert!(outcome.results.windows(2).all(|w| w[0].score >= w[1].score));
        let unique: HashSet<_> = outcome.results.iter().map(|r| &r.id).collect();
        assert_eq!(unique.len(), outcome.results.len());
    }
}
