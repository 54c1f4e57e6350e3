//! promptdex library
//!
//! Finds the most relevant prompt file in a local collection.
//!
//! # Modules
//!
//! - `core`: Configuration, document discovery and fingerprinting, errors
//! - `search`: Embedding capability, vector index, snapshots, keyword fallback

pub mod core;
pub mod search;

// Re-exports for convenience
pub use crate::core::config::SearchConfig;
pub use crate::core::document::{document_fingerprint, Document, DocumentCollector};
pub use crate::core::error::{Result, SearchError};
pub use search::{
    EmbeddingCapability, EmbeddingProvider, HybridScorer, IndexState, IndexStatus, SearchMode,
    SearchResponse, SearchResult, SearchService, Signature, VectorIndex,
};
