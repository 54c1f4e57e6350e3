//! Deterministic keyword relevance, available with or without embeddings.

use regex::{Regex, RegexBuilder};

use crate::core::document::Document;
use crate::core::error::{Result, SearchError};

const NAME_WEIGHT: u32 = 2;
const CONTENT_WEIGHT: u32 = 1;
const PATH_WEIGHT: u32 = 1;

/// Scores documents by case-insensitive substring hits on the whole query:
/// +2 for the file name, +1 for the content, +1 for the relative path.
pub struct HybridScorer {
    pattern: Regex,
}

impl HybridScorer {
    pub fn new(query: &str) -> Result<Self> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidInput("empty query".into()));
        }
        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .map_err(|e| SearchError::InvalidInput(e.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn score(&self, doc: &Document) -> u32 {
        let mut score = 0;
        if self.pattern.is_match(&doc.name) {
            score += NAME_WEIGHT;
        }
        if self.pattern.is_match(&doc.content) {
            score += CONTENT_WEIGHT;
        }
        if self.pattern.is_match(&doc.relative_path) {
            score += PATH_WEIGHT;
        }
        score
    }

    /// Documents with a non-zero score, best first, ties in input order.
    pub fn rank<'a>(&self, documents: &'a [Document], k: usize) -> Vec<(&'a Document, u32)> {
        let mut scored: Vec<(&Document, u32)> = documents
            .iter()
            .map(|d| (d, self.score(d)))
            .filter(|(_, s)| *s > 0)
            .collect();
        // Stable sort keeps scan order among equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(k);
        scored
    }
}
