//! Search configuration, optionally read from a YAML file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::error::SearchError;
use super::paths::{expand_home, DataPaths};

/// Default document extensions (without the leading dot).
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["txt", "md", "prompt"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Document roots, scanned recursively.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Snapshot directory. Defaults to `.prompts_index` under the first root.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: ModelConfig,
    /// Rescan documents on every `ensure_index` and rebuild when they changed.
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `htp` for the bundled provider, `none` to run keyword-only.
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    5
}

fn default_batch_size() -> usize {
    32
}

fn default_model_name() -> String {
    "htp".to_string()
}

fn default_dimension() -> usize {
    384
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimension: default_dimension(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: default_extensions(),
            index_dir: None,
            model: ModelConfig::default(),
            auto_refresh: true,
            default_limit: default_limit(),
            batch_size: default_batch_size(),
        }
    }
}

impl SearchConfig {
    /// Config rooted at a single document directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    /// Read a YAML config. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default().normalized());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        if config.extensions.is_empty() {
            anyhow::bail!("extensions must not be empty");
        }

        Ok(config.normalized())
    }

    /// Expand `~` in paths, strip leading dots from extensions and fall back to
    /// the default repository root when no roots are configured.
    pub fn normalized(mut self) -> Self {
        if self.roots.is_empty() {
            self.roots.push(DataPaths::new().repo);
        }
        self.roots = self.roots.iter().map(|r| expand_home(r)).collect();
        self.index_dir = self.index_dir.as_deref().map(expand_home);
        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn index_dir(&self) -> PathBuf {
        match (&self.index_dir, self.roots.first()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(root)) => DataPaths::index_dir_for(root),
            (None, None) => DataPaths::index_dir_for(&DataPaths::new().repo),
        }
    }

    /// Report unusable roots. They are skipped at scan time, never fatal.
    pub fn validate(&self) -> Vec<SearchError> {
        self.roots
            .iter()
            .filter_map(|root| {
                let reason = if !root.exists() {
                    "does not exist"
                } else if !root.is_dir() {
                    "is not a directory"
                } else {
                    return None;
                };
                Some(SearchError::Configuration {
                    path: root.clone(),
                    reason: reason.to_string(),
                })
            })
            .collect()
    }
}
