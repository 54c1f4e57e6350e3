//! Error taxonomy for indexing and search.
//!
//! Every failure is local to one operation; nothing here terminates the process.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// A configured root is missing or unusable. The root is skipped.
    #[error("invalid document root {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    /// The embedding model could not be initialized or failed while embedding.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The persisted snapshot was built for another model, dimension or document set.
    #[error("snapshot signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The persisted snapshot failed structural validation.
    #[error("snapshot is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("snapshot persistence failed: {0}")]
    Persistence(String),

    #[error("no documents found in the configured roots")]
    NoDocumentsFound,

    #[error("an index build is already in progress")]
    BuildInProgress,

    /// Caller passed inconsistent data (e.g. vector/document length mismatch).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SearchError {
    /// Snapshot problems that are resolved by rebuilding rather than surfaced.
    pub fn is_rebuild_trigger(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_) | Self::IndexCorrupt(_))
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for SearchError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
