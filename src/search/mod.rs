//! Retrieval engine
//!
//! Semantic search over an exact vector index, with keyword scoring as the
//! always-available fallback.

pub mod embedding;
pub mod engine;
pub mod htp;
pub mod index;
pub mod keyword;
pub mod vectordb;

pub use embedding::{EmbeddingCapability, EmbeddingProvider};
pub use engine::{
    BuildReport, IndexState, IndexStatus, Score, SearchMode, SearchResponse, SearchResult,
    SearchService,
};
pub use htp::HtpEmbedder;
pub use index::{Signature, VectorIndex};
pub use keyword::HybridScorer;
pub use vectordb::SnapshotStore;
