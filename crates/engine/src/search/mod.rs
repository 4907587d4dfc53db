//! Vector search: client boundary, concurrent coordinator and backends.

pub mod client;
pub mod coordinator;
pub mod memory;
pub mod qdrant;

pub use client::SearchClient;
pub use coordinator::{merge_results, SearchCoordinator, SearchOutcome};
pub use memory::{CorpusDocument, MemorySearchClient};
pub use qdrant::{OllamaEmbedder, QdrantSearchClient};
