use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use super::config::SearchConfig;

/// Snapshot of one source file at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Absolute path.
    pub id: PathBuf,
    /// Path relative to the root that contains the file.
    pub relative_path: String,
    /// File name including extension.
    pub name: String,
    pub content: String,
    /// SHA-256 of the file bytes, lowercase hex.
    pub content_hash: String,
}

impl Document {
    pub fn new(id: PathBuf, relative_path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let name = id
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            content_hash: content_hash(content.as_bytes()),
            relative_path: relative_path.into(),
            name,
            content,
            id,
        }
    }

    /// First `max_lines` non-empty lines joined by ` | `.
    pub fn summary(&self, max_lines: usize) -> String {
        self.content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(max_lines)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Aggregate hash over a document set.
///
/// Built from the sorted content hashes followed by the sorted document ids,
/// so any edit, addition, removal or rename yields a new fingerprint.
pub fn document_fingerprint<'a>(documents: impl IntoIterator<Item = &'a Document>) -> String {
    let (mut hashes, mut ids): (Vec<&str>, Vec<String>) = documents
        .into_iter()
        .map(|d| (d.content_hash.as_str(), d.id.to_string_lossy().to_string()))
        .unzip();
    hashes.sort_unstable();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\0");
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Discovers documents under one or more roots.
#[derive(Debug, Clone)]
pub struct DocumentCollector {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl DocumentCollector {
    pub fn new(roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self { roots, extensions }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.roots.clone(), config.extensions.clone())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Lazily read documents in path order. Each call starts a fresh scan.
    pub fn iter(&self) -> Documents {
        Documents {
            pending: self.discover().into_iter(),
        }
    }

    pub fn collect(&self) -> Vec<Document> {
        self.iter().collect()
    }

    /// All documents, optionally filtered by a case-insensitive keyword in
    /// name or content.
    pub fn list(&self, filter: Option<&str>) -> Vec<Document> {
        let needle = filter.map(str::to_lowercase).filter(|f| !f.is_empty());
        self.iter()
            .filter(|doc| match &needle {
                Some(n) => {
                    doc.name.to_lowercase().contains(n) || doc.content.to_lowercase().contains(n)
                }
                None => true,
            })
            .collect()
    }

    /// Matching file paths with the root each belongs to, sorted by path.
    fn discover(&self) -> Vec<(PathBuf, PathBuf)> {
        let mut found = Vec::new();

        for root in &self.roots {
            let root = match fs::canonicalize(root) {
                Ok(r) if r.is_dir() => r,
                Ok(_) => {
                    tracing::warn!(root = %root.display(), "document root is not a directory, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "document root is inaccessible, skipping");
                    continue;
                }
            };

            let walker = WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if entry.file_type().is_file() && self.has_allowed_extension(entry.path()) {
                    found.push((entry.into_path(), root.clone()));
                }
            }
        }

        // Stable sort keeps root order for duplicates, so the first root wins.
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.dedup_by(|a, b| a.0 == b.0);
        found
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Restartable, finite document sequence produced by [`DocumentCollector::iter`].
pub struct Documents {
    pending: std::vec::IntoIter<(PathBuf, PathBuf)>,
}

impl Iterator for Documents {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        for (path, root) in self.pending.by_ref() {
            if let Some(doc) = read_document(&path, &root) {
                return Some(doc);
            }
        }
        None
    }
}

fn read_document(path: &Path, root: &Path) -> Option<Document> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read document, skipping");
            return None;
        }
    };
    let content = match String::from_utf8(bytes) {
        Ok(c) => c,
        Err(_) => {
            tracing::warn!(path = %path.display(), "document is not valid UTF-8, skipping");
            return None;
        }
    };
    if content.trim().is_empty() {
        tracing::debug!(path = %path.display(), "empty document, skipping");
        return None;
    }

    let relative_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    Some(Document::new(path.to_path_buf(), relative_path, content))
}
