//! Search client boundary.

use crate::types::SearchResult;
use reasoner_core::AppResult;

/// Trait for vector similarity search providers.
///
/// Implementations return scored passages for one query string and fail
/// with `AppError::Search` when the backend is unreachable.
#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    /// Short name used in logs (e.g., a collection name).
    fn name(&self) -> &str;

    /// Search for passages similar to `query`.
    ///
    /// # Arguments
    /// * `query` - Free-text query
    /// * `limit` - Maximum number of results
    /// * `score_threshold` - Minimum similarity score to return
    async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> AppResult<Vec<SearchResult>>;
}
