//! Search service - owns the index lifecycle and picks the search path
//!
//! Semantic search runs against a Ready [`VectorIndex`]. When embeddings are
//! unavailable for the session, or no index can be built, queries fall back
//! to [`HybridScorer`] over a fresh document scan.

use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::embedding::{EmbeddingCapability, EmbeddingProvider};
use super::index::{Signature, VectorIndex};
use super::keyword::HybridScorer;
use super::vectordb::SnapshotStore;
use crate::core::config::SearchConfig;
use crate::core::document::{document_fingerprint, Document, DocumentCollector};
use crate::core::error::{Result, SearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Keyword,
}

/// Cosine similarity for semantic hits, integer relevance for keyword hits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Score {
    Semantic(f32),
    Keyword(u32),
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Semantic(s) => write!(f, "{s:.3}"),
            Self::Keyword(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub document: Document,
    pub score: Score,
    /// 1-based.
    pub rank: usize,
}

impl SearchResult {
    pub fn name(&self) -> &str {
        &self.document.name
    }

    pub fn relative_path(&self) -> &str {
        &self.document.relative_path
    }

    pub fn content(&self) -> &str {
        &self.document.content
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub results: Vec<SearchResult>,
    /// Why results are empty or why the keyword path was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl SearchResponse {
    fn empty(mode: SearchMode, notice: impl Into<String>) -> Self {
        Self {
            mode,
            results: Vec::new(),
            notice: Some(notice.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    NotBuilt,
    Ready,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub persisted: bool,
}

/// Outcome of a successful [`SearchService::rebuild`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub document_count: usize,
    pub dimension: usize,
    pub duration_ms: u128,
}

pub struct SearchService {
    config: SearchConfig,
    collector: DocumentCollector,
    store: SnapshotStore,
    capability: EmbeddingCapability,
    snapshot: RwLock<Option<Arc<VectorIndex>>>,
    /// Set once embeddings fail; never cleared for the lifetime of the service.
    degraded: RwLock<Option<String>>,
    build_lock: Mutex<()>,
}

impl SearchService {
    pub fn new(config: SearchConfig, capability: EmbeddingCapability) -> Self {
        let collector = DocumentCollector::from_config(&config);
        let store = SnapshotStore::new(config.index_dir());

        for problem in config.validate() {
            tracing::warn!("{problem}");
        }

        let service = Self {
            config,
            collector,
            store,
            capability,
            snapshot: RwLock::new(None),
            degraded: RwLock::new(None),
            build_lock: Mutex::new(()),
        };
        if let EmbeddingCapability::Unavailable { reason } = &service.capability {
            service.mark_degraded(reason.clone());
        }
        service
    }

    /// Service using the embedding provider named in `config.model`.
    pub fn from_config(config: SearchConfig) -> Self {
        let capability = EmbeddingCapability::from_config(&config.model);
        Self::new(config, capability)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn collector(&self) -> &DocumentCollector {
        &self.collector
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Make the semantic path Ready if possible.
    ///
    /// Order: valid in-memory snapshot, then the persisted snapshot, then a
    /// fresh build. An embedding failure here switches the service to
    /// degraded mode for good and returns `Ok(IndexState::Degraded)`.
    pub fn ensure_index(&self) -> Result<IndexState> {
        let Some(provider) = self.provider() else {
            return Ok(IndexState::Degraded);
        };

        if !self.config.auto_refresh && self.current().is_some() {
            return Ok(IndexState::Ready);
        }

        let documents = self.collector.collect();
        let fingerprint = document_fingerprint(&documents);
        let expected = |index: &VectorIndex| {
            let sig = index.signature();
            sig.model_id == provider.model_id()
                && sig.dimension == provider.dimension()
                && sig.document_fingerprint == fingerprint
        };

        if let Some(index) = self.current() {
            if expected(index.as_ref()) {
                return Ok(IndexState::Ready);
            }
            tracing::info!("documents changed since the index was built, refreshing");
        }

        let _guard = match self.build_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                // Another caller is building; keep serving what we have.
                return match self.current() {
                    Some(_) => Ok(IndexState::Ready),
                    None => Err(SearchError::BuildInProgress),
                };
            }
        };

        // A concurrent build may have finished while we were scanning.
        if let Some(index) = self.current() {
            if expected(index.as_ref()) {
                return Ok(IndexState::Ready);
            }
        }

        if documents.is_empty() {
            self.install(None);
            return Err(SearchError::NoDocumentsFound);
        }

        match self.store.load(provider.model_id(), provider.dimension()) {
            Ok(Some(index)) if expected(&index) => {
                self.install(Some(index));
                return Ok(IndexState::Ready);
            }
            Ok(Some(_)) => tracing::info!("persisted snapshot is stale, rebuilding"),
            Ok(None) => tracing::info!("no persisted snapshot, building index"),
            Err(e) if e.is_rebuild_trigger() => tracing::info!("{e}, rebuilding"),
            Err(e) => tracing::warn!("{e}, rebuilding"),
        }

        let index = match build_index(provider.as_ref(), documents, self.config.batch_size) {
            Ok(index) => index,
            Err(SearchError::ProviderUnavailable(reason)) => {
                self.install(None);
                self.mark_degraded(reason);
                return Ok(IndexState::Degraded);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.store.persist(&index) {
            tracing::warn!("{e}; index kept in memory only");
        }
        self.install(Some(index));
        Ok(IndexState::Ready)
    }

    /// Install the persisted snapshot if it still matches the documents on
    /// disk. Never embeds anything.
    pub fn restore(&self) -> Result<IndexState> {
        let Some(provider) = self.provider() else {
            return Ok(IndexState::Degraded);
        };
        if self.current().is_some() {
            return Ok(IndexState::Ready);
        }

        let index = match self.store.load(provider.model_id(), provider.dimension()) {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(IndexState::NotBuilt),
            Err(e) if e.is_rebuild_trigger() => {
                tracing::info!("{e}");
                return Ok(IndexState::NotBuilt);
            }
            Err(e) => return Err(e),
        };
        let fingerprint = document_fingerprint(&self.collector.collect());
        if index.signature().document_fingerprint != fingerprint {
            return Ok(IndexState::NotBuilt);
        }
        self.install(Some(index));
        Ok(IndexState::Ready)
    }

    /// Answer `query` with at most `k` results.
    ///
    /// Never fails: problems are reported through [`SearchResponse::notice`]
    /// and the keyword path takes over where possible.
    pub fn search(&self, query: &str, k: usize) -> SearchResponse {
        if query.trim().is_empty() || k == 0 {
            return SearchResponse::empty(self.preferred_mode(), "empty query");
        }

        let notice = match self.ensure_index() {
            Ok(IndexState::Ready) => match self.semantic_search(query, k) {
                Ok(response) => return response,
                Err(SearchError::ProviderUnavailable(reason)) => {
                    self.mark_degraded(reason.clone());
                    Some(format!("embedding provider failed ({reason}), using keyword search"))
                }
                Err(e) => {
                    tracing::warn!("semantic search failed: {e}");
                    Some(format!("semantic search failed ({e}), using keyword search"))
                }
            },
            Ok(_) => None,
            Err(SearchError::NoDocumentsFound) => {
                return SearchResponse::empty(
                    SearchMode::Keyword,
                    format!("no documents found in {}", self.describe_roots()),
                );
            }
            Err(e) => Some(format!("index unavailable ({e}), using keyword search")),
        };

        let mut response = self.keyword_search(query, k);
        if response.notice.is_none() {
            response.notice = notice;
        }
        response
    }

    /// Keyword-only search over the current document collection.
    pub fn keyword_search(&self, query: &str, k: usize) -> SearchResponse {
        let scorer = match HybridScorer::new(query) {
            Ok(s) => s,
            Err(e) => return SearchResponse::empty(SearchMode::Keyword, e.to_string()),
        };

        let documents = self.collector.collect();
        if documents.is_empty() {
            return SearchResponse::empty(
                SearchMode::Keyword,
                format!("no documents found in {}", self.describe_roots()),
            );
        }

        let results = scorer
            .rank(&documents, k)
            .into_iter()
            .enumerate()
            .map(|(i, (doc, score))| SearchResult {
                document: doc.clone(),
                score: Score::Keyword(score),
                rank: i + 1,
            })
            .collect();

        SearchResponse {
            mode: SearchMode::Keyword,
            results,
            notice: None,
        }
    }

    /// Rebuild from scratch, ignoring any cached or persisted snapshot.
    ///
    /// The previous snapshot stays in place until the new one is built. If
    /// only persisting fails, the new index is still served from memory and
    /// the `Persistence` error is returned.
    pub fn rebuild(&self) -> Result<BuildReport> {
        let provider = self.provider().ok_or_else(|| {
            SearchError::ProviderUnavailable(
                self.degraded_reason()
                    .unwrap_or_else(|| "embedding provider unavailable".to_string()),
            )
        })?;

        let _guard = match self.build_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(SearchError::BuildInProgress),
        };

        let start = Instant::now();
        let documents = self.collector.collect();
        if documents.is_empty() {
            self.install(None);
            return Err(SearchError::NoDocumentsFound);
        }

        let index = build_index(provider.as_ref(), documents, self.config.batch_size)?;
        let report = BuildReport {
            document_count: index.len(),
            dimension: index.dimension(),
            duration_ms: start.elapsed().as_millis(),
        };

        let persisted = self.store.persist(&index);
        self.install(Some(index));
        persisted?;

        Ok(report)
    }

    pub fn get_status(&self) -> IndexStatus {
        let persisted = self.store.exists();

        if let Some(reason) = self.degraded_reason() {
            return IndexStatus {
                state: IndexState::Degraded,
                document_count: self.collector.iter().count(),
                model_id: None,
                signature: None,
                built_at: None,
                degraded_reason: Some(reason),
                persisted,
            };
        }

        match self.current() {
            Some(index) => IndexStatus {
                state: IndexState::Ready,
                document_count: index.len(),
                model_id: Some(index.signature().model_id.clone()),
                signature: Some(index.signature().clone()),
                built_at: Some(index.built_at()),
                degraded_reason: None,
                persisted,
            },
            None => IndexStatus {
                state: IndexState::NotBuilt,
                document_count: self.collector.iter().count(),
                model_id: None,
                signature: None,
                built_at: None,
                degraded_reason: None,
                persisted,
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason().is_some()
    }

    fn semantic_search(&self, query: &str, k: usize) -> Result<SearchResponse> {
        let provider = self
            .provider()
            .ok_or_else(|| SearchError::ProviderUnavailable("provider not available".into()))?;
        let index = self.current().ok_or(SearchError::BuildInProgress)?;

        let vector = provider.embed_query(query).map_err(|e| match e {
            SearchError::ProviderUnavailable(reason) => SearchError::ProviderUnavailable(reason),
            other => SearchError::ProviderUnavailable(other.to_string()),
        })?;
        let results = index
            .query(&vector, k)?
            .into_iter()
            .enumerate()
            .map(|(i, (doc, score))| SearchResult {
                document: doc.clone(),
                score: Score::Semantic(score),
                rank: i + 1,
            })
            .collect();

        Ok(SearchResponse {
            mode: SearchMode::Semantic,
            results,
            notice: None,
        })
    }

    fn provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        if self.is_degraded() {
            return None;
        }
        self.capability.provider().cloned()
    }

    fn current(&self) -> Option<Arc<VectorIndex>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, index: Option<VectorIndex>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = index.map(Arc::new);
    }

    fn degraded_reason(&self) -> Option<String> {
        self.degraded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mark_degraded(&self, reason: String) {
        let mut degraded = self.degraded.write().unwrap_or_else(PoisonError::into_inner);
        if degraded.is_none() {
            tracing::warn!("semantic search unavailable, using keyword search: {reason}");
            *degraded = Some(reason);
        }
    }

    fn preferred_mode(&self) -> SearchMode {
        if self.is_degraded() {
            SearchMode::Keyword
        } else {
            SearchMode::Semantic
        }
    }

    fn describe_roots(&self) -> String {
        self.collector
            .roots()
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Embed `documents` in batches and build the index.
///
/// Every failure that originates in the provider comes back as
/// `ProviderUnavailable`.
fn build_index(
    provider: &dyn EmbeddingProvider,
    documents: Vec<Document>,
    batch_size: usize,
) -> Result<VectorIndex> {
    let start = Instant::now();
    let dimension = provider.dimension();
    let mut vectors = Vec::with_capacity(documents.len());

    if dimension == 0 {
        return Err(SearchError::ProviderUnavailable(format!(
            "{} reports a zero dimension",
            provider.model_id()
        )));
    }

    for batch in documents.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
        let embedded = provider.embed(&texts).map_err(|e| match e {
            SearchError::ProviderUnavailable(reason) => SearchError::ProviderUnavailable(reason),
            other => SearchError::ProviderUnavailable(other.to_string()),
        })?;
        if embedded.len() != texts.len() {
            return Err(SearchError::ProviderUnavailable(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            )));
        }
        if let Some(bad) = embedded.iter().find(|v| v.len() != dimension) {
            return Err(SearchError::ProviderUnavailable(format!(
                "provider returned a {}-dimension vector, expected {}",
                bad.len(),
                dimension
            )));
        }
        vectors.extend(embedded);
    }

    let index = VectorIndex::build(provider.model_id(), documents, vectors)?;
    tracing::info!(
        documents = index.len(),
        model = provider.model_id(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "index built"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::htp::HtpEmbedder;
    use anyhow::Result;
    use std::path::Path;

    fn service(root: &Path) -> SearchService {
        SearchService::new(
            SearchConfig::with_root(root),
            EmbeddingCapability::from_factory(|| HtpEmbedder::with_dimension(64)),
        )
    }

    #[test]
    fn test_empty_root_is_not_built() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let svc = service(dir.path());

        assert!(matches!(svc.ensure_index(), Err(SearchError::NoDocumentsFound)));
        assert_eq!(svc.get_status().state, IndexState::NotBuilt);

        let response = svc.search("anything", 5);
        assert!(response.results.is_empty());
        assert!(response.notice.is_some());
        assert!(matches!(svc.rebuild(), Err(SearchError::NoDocumentsFound)));
        Ok(())
    }

    #[test]
    fn test_empty_query_and_zero_k() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.md"), "alpha")?;
        let svc = service(dir.path());
        assert!(svc.search("   ", 5).results.is_empty());
        assert!(svc.search("alpha", 0).results.is_empty());
        Ok(())
    }

    #[test]
    fn test_keyword_search_ranks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("python_doc.md"), "Python function doc")?;
        std::fs::write(dir.path().join("other.md"), "unrelated")?;
        let svc = service(dir.path());

        let response = svc.keyword_search("python", 5);
        assert_eq!(response.mode, SearchMode::Keyword);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].name(), "python_doc.md");
        assert_eq!(response.results[0].rank, 1);
        // name + content + relative path
        assert_eq!(response.results[0].score, Score::Keyword(4));
        Ok(())
    }

    #[test]
    fn test_build_lock_rejects_concurrent_rebuild() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.md"), "alpha")?;
        let svc = service(dir.path());

        let _held = svc.build_lock.lock().unwrap();
        assert!(matches!(svc.rebuild(), Err(SearchError::BuildInProgress)));
        assert!(matches!(svc.ensure_index(), Err(SearchError::BuildInProgress)));
        // Searches still work through the keyword path.
        let response = svc.search("alpha", 5);
        assert_eq!(response.mode, SearchMode::Keyword);
        assert_eq!(response.results.len(), 1);
        Ok(())
    }

    #[test]
    fn test_score_serializes_as_number() -> Result<()> {
        assert_eq!(serde_json::to_string(&Score::Keyword(3))?, "3");
        assert_eq!(serde_json::to_string(&Score::Semantic(0.5))?, "0.5");
        assert_eq!(serde_json::to_string(&IndexState::NotBuilt)?, "\"not_built\"");
        Ok(())
    }
}
