use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use promptdex::search::SnapshotStore;
use promptdex::{
    EmbeddingCapability, EmbeddingProvider, IndexState, SearchConfig, SearchError, SearchMode,
    SearchService,
};

/// Letter-frequency embedder that counts how many texts it embedded.
struct LetterCounts {
    embedded: Arc<AtomicUsize>,
}

impl EmbeddingProvider for LetterCounts {
    fn model_id(&self) -> &str {
        "letters-26"
    }

    fn dimension(&self) -> usize {
        26
    }

    fn embed(&self, texts: &[&str]) -> promptdex::Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; 26];
                for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Constructs fine but fails on every call.
struct Broken;

impl EmbeddingProvider for Broken {
    fn model_id(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        4
    }

    fn embed(&self, _texts: &[&str]) -> promptdex::Result<Vec<Vec<f32>>> {
        Err(SearchError::ProviderUnavailable("inference backend crashed".into()))
    }
}

/// Fails with an error other than `ProviderUnavailable`, counting calls.
struct TimingOut {
    calls: Arc<AtomicUsize>,
}

impl EmbeddingProvider for TimingOut {
    fn model_id(&self) -> &str {
        "timing-out"
    }

    fn dimension(&self) -> usize {
        4
    }

    fn embed(&self, _texts: &[&str]) -> promptdex::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SearchError::InvalidInput("backend timeout".into()))
    }
}

/// Reports a zero dimension.
struct Dimensionless;

impl EmbeddingProvider for Dimensionless {
    fn model_id(&self) -> &str {
        "dimensionless"
    }

    fn dimension(&self) -> usize {
        0
    }

    fn embed(&self, texts: &[&str]) -> promptdex::Result<Vec<Vec<f32>>> {
        Ok(vec![Vec::new(); texts.len()])
    }
}

/// Letter counts until `failing` is set.
struct Switchable {
    inner: LetterCounts,
    failing: Arc<AtomicBool>,
}

impl EmbeddingProvider for Switchable {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, texts: &[&str]) -> promptdex::Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::ProviderUnavailable("model crashed".into()));
        }
        self.inner.embed(texts)
    }
}

fn letters() -> (EmbeddingCapability, Arc<AtomicUsize>) {
    let embedded = Arc::new(AtomicUsize::new(0));
    let provider = LetterCounts {
        embedded: embedded.clone(),
    };
    (EmbeddingCapability::Available(Arc::new(provider)), embedded)
}

fn seed(root: &Path) -> Result<()> {
    fs::write(root.join("python_doc.md"), "Python function doc")?;
    fs::write(root.join("other.md"), "unrelated")?;
    fs::create_dir_all(root.join("review"))?;
    fs::write(root.join("review/code_review.prompt"), "Review this code for bugs")?;
    fs::write(root.join("summary.txt"), "Summarize the following text")?;
    Ok(())
}

fn config(root: &Path) -> SearchConfig {
    SearchConfig::with_root(root)
}

#[test]
fn degraded_when_provider_construction_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;

    let capability = EmbeddingCapability::from_factory(|| -> Result<LetterCounts, String> {
        Err("model not found".to_string())
    });
    let service = SearchService::new(config(dir.path()), capability);

    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    let status = service.get_status();
    assert_eq!(status.state, IndexState::Degraded);
    assert_eq!(status.document_count, 4);
    assert_eq!(status.degraded_reason.as_deref(), Some("model not found"));

    let response = service.search("python", 5);
    assert_eq!(response.mode, SearchMode::Keyword);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].name(), "python_doc.md");
    assert_eq!(response.results[0].rank, 1);

    assert!(matches!(service.rebuild(), Err(SearchError::ProviderUnavailable(_))));
    assert!(!service.store().exists());
    Ok(())
}

#[test]
fn embedding_failure_during_build_is_permanent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let service = SearchService::new(config(dir.path()), EmbeddingCapability::Available(Arc::new(Broken)));

    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    assert!(service.is_degraded());
    // Later calls do not retry the provider.
    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    assert_eq!(service.get_status().state, IndexState::Degraded);

    let response = service.search("review", 5);
    assert_eq!(response.mode, SearchMode::Keyword);
    assert_eq!(response.results[0].name(), "code_review.prompt");
    Ok(())
}

#[test]
fn any_embedding_error_degrades_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = TimingOut {
        calls: calls.clone(),
    };
    let service = SearchService::new(config(dir.path()), EmbeddingCapability::Available(Arc::new(provider)));

    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "provider must not be retried");

    let status = service.get_status();
    assert_eq!(status.state, IndexState::Degraded);
    assert!(status.degraded_reason.unwrap_or_default().contains("backend timeout"));

    let response = service.search("python", 5);
    assert_eq!(response.mode, SearchMode::Keyword);
    assert_eq!(response.results[0].name(), "python_doc.md");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn zero_dimension_provider_degrades() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let service = SearchService::new(
        config(dir.path()),
        EmbeddingCapability::Available(Arc::new(Dimensionless)),
    );

    assert_eq!(service.ensure_index()?, IndexState::Degraded);
    assert_eq!(service.search("review", 5).mode, SearchMode::Keyword);
    assert!(!service.store().exists());
    Ok(())
}

#[test]
fn failed_rebuild_keeps_working_index() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let failing = Arc::new(AtomicBool::new(false));
    let provider = Switchable {
        inner: LetterCounts {
            embedded: Arc::new(AtomicUsize::new(0)),
        },
        failing: failing.clone(),
    };
    let service = SearchService::new(config(dir.path()), EmbeddingCapability::Available(Arc::new(provider)));

    service.rebuild()?;
    let before = service.get_status().signature;

    failing.store(true, Ordering::SeqCst);
    assert!(matches!(service.rebuild(), Err(SearchError::ProviderUnavailable(_))));

    let status = service.get_status();
    assert_eq!(status.state, IndexState::Ready);
    assert_eq!(status.signature, before);
    let persisted = service.store().load("letters-26", 26)?.expect("snapshot kept");
    assert_eq!(persisted.len(), 4);

    // A failing query embedding switches to keyword search for good.
    assert_eq!(service.search("python function", 2).mode, SearchMode::Keyword);
    assert!(service.is_degraded());
    Ok(())
}

#[test]
fn restore_installs_matching_snapshot_without_embedding() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    SearchService::new(config(dir.path()), capability).rebuild()?;

    let (capability, embedded) = letters();
    let service = SearchService::new(config(dir.path()), capability);
    assert_eq!(service.get_status().state, IndexState::NotBuilt);
    assert_eq!(service.restore()?, IndexState::Ready);
    assert_eq!(service.get_status().state, IndexState::Ready);
    assert_eq!(service.get_status().document_count, 4);
    assert_eq!(embedded.load(Ordering::SeqCst), 0);

    fs::write(dir.path().join("translate.md"), "Translate into French")?;
    let (capability, _) = letters();
    let stale = SearchService::new(config(dir.path()), capability);
    assert_eq!(stale.restore()?, IndexState::NotBuilt);
    Ok(())
}

#[test]
fn semantic_results_are_bounded_and_ordered() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(config(dir.path()), capability);

    assert_eq!(service.ensure_index()?, IndexState::Ready);
    for k in 1..7 {
        let response = service.search("review code", k);
        assert_eq!(response.mode, SearchMode::Semantic);
        assert_eq!(response.results.len(), k.min(4));
        let scores: Vec<f32> = response
            .results
            .iter()
            .map(|r| match r.score {
                promptdex::search::Score::Semantic(s) => s,
                promptdex::search::Score::Keyword(_) => panic!("expected semantic score"),
            })
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        let ranks: Vec<usize> = response.results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (1..=k.min(4)).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn persisted_snapshot_is_reused_across_services() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;

    let (capability, _) = letters();
    let first = SearchService::new(config(dir.path()), capability);
    let report = first.rebuild()?;
    assert_eq!(report.document_count, 4);
    assert_eq!(report.dimension, 26);
    let original = first.search("summarize text", 4);

    let (capability, embedded) = letters();
    let second = SearchService::new(config(dir.path()), capability);
    assert_eq!(second.ensure_index()?, IndexState::Ready);
    assert_eq!(embedded.load(Ordering::SeqCst), 0, "snapshot should load, not rebuild");

    let reloaded = second.search("summarize text", 4);
    assert_eq!(original.results.len(), reloaded.results.len());
    for (a, b) in original.results.iter().zip(reloaded.results.iter()) {
        assert_eq!(a.document.id, b.document.id);
        match (a.score, b.score) {
            (promptdex::search::Score::Semantic(x), promptdex::search::Score::Semantic(y)) => {
                assert!((x - y).abs() < 1e-6)
            }
            other => panic!("expected semantic scores, got {other:?}"),
        }
    }

    assert_eq!(first.get_status().signature, second.get_status().signature);
    Ok(())
}

#[test]
fn rebuild_twice_yields_same_signature() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(config(dir.path()), capability);

    service.rebuild()?;
    let first = service.get_status().signature;
    service.rebuild()?;
    let second = service.get_status().signature;
    assert!(first.is_some());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn added_document_is_detected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(config(dir.path()), capability);

    service.ensure_index()?;
    let before = service.get_status().signature.expect("ready");

    fs::write(dir.path().join("translate.md"), "Translate into French")?;
    assert_eq!(service.ensure_index()?, IndexState::Ready);
    let after = service.get_status().signature.expect("ready");

    assert_ne!(before.document_fingerprint, after.document_fingerprint);
    assert_eq!(after.document_count, 5);

    let response = service.search("translate french", 5);
    assert!(response.results.iter().any(|r| r.name() == "translate.md"));
    Ok(())
}

#[test]
fn without_auto_refresh_stale_index_is_served_until_rebuild() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(
        SearchConfig {
            auto_refresh: false,
            ..config(dir.path())
        },
        capability,
    );

    service.ensure_index()?;
    fs::write(dir.path().join("translate.md"), "Translate into French")?;
    service.ensure_index()?;
    assert_eq!(service.get_status().document_count, 4);

    service.rebuild()?;
    assert_eq!(service.get_status().document_count, 5);
    Ok(())
}

#[test]
fn rebuild_after_deleting_snapshot_dir() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(config(dir.path()), capability);

    service.rebuild()?;
    fs::remove_dir_all(service.store().dir())?;
    assert!(!service.store().exists());

    service.rebuild()?;
    let store = SnapshotStore::new(service.store().dir());
    let loaded = store.load("letters-26", 26)?.expect("snapshot written");
    assert_eq!(loaded.len(), 4);
    Ok(())
}

#[test]
fn snapshot_from_other_model_is_replaced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;

    let htp = SearchService::from_config(config(dir.path()));
    htp.rebuild()?;

    let (capability, embedded) = letters();
    let service = SearchService::new(config(dir.path()), capability);
    assert_eq!(service.ensure_index()?, IndexState::Ready);
    assert_eq!(embedded.load(Ordering::SeqCst), 4);

    let stored = service.store().describe()?.expect("snapshot");
    assert_eq!(stored.signature.model_id, "letters-26");
    Ok(())
}

#[test]
fn persistence_failure_keeps_index_in_memory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let docs = dir.path().join("docs");
    fs::create_dir_all(&docs)?;
    seed(&docs)?;
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory")?;

    let (capability, _) = letters();
    let service = SearchService::new(
        SearchConfig {
            index_dir: Some(blocker.join("index")),
            ..config(&docs)
        },
        capability,
    );

    assert!(matches!(service.rebuild(), Err(SearchError::Persistence(_))));
    assert_eq!(service.get_status().state, IndexState::Ready);
    assert_eq!(service.search("python", 2).mode, SearchMode::Semantic);
    Ok(())
}

#[test]
fn corrupt_snapshot_triggers_rebuild() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(config(dir.path()), capability);

    fs::create_dir_all(service.store().dir())?;
    fs::write(service.store().path(), b"garbage")?;

    assert_eq!(service.ensure_index()?, IndexState::Ready);
    assert!(service.store().describe()?.is_some());
    Ok(())
}

#[test]
fn concurrent_searches_share_a_ready_index() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = Arc::new(SearchService::new(
        SearchConfig {
            auto_refresh: false,
            ..config(dir.path())
        },
        capability,
    ));
    service.ensure_index()?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.search("python function", 3))
        })
        .collect();

    for handle in handles {
        let response = handle.join().expect("search thread panicked");
        assert_eq!(response.mode, SearchMode::Semantic);
        assert_eq!(response.results.len(), 3);
    }
    Ok(())
}

#[test]
fn missing_root_still_searches_other_roots() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let (capability, _) = letters();
    let service = SearchService::new(
        SearchConfig {
            roots: vec![dir.path().join("missing"), dir.path().to_path_buf()],
            index_dir: Some(dir.path().join(".idx")),
            ..SearchConfig::default()
        },
        capability,
    );

    assert_eq!(service.ensure_index()?, IndexState::Ready);
    assert_eq!(service.get_status().document_count, 4);
    Ok(())
}
