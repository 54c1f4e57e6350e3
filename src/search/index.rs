//! Exact brute-force vector index over unit-normalized embeddings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::embedding::{dot, normalize};
use crate::core::document::{document_fingerprint, Document};
use crate::core::error::{Result, SearchError};

/// Identifies build compatibility. Two snapshots are interchangeable only
/// when their signatures are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub model_id: String,
    pub dimension: usize,
    pub document_fingerprint: String,
    pub document_count: usize,
}

/// Ready index: one row per document, in scan order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    signature: Signature,
    /// Row-major `document_count x dimension` matrix.
    matrix: Vec<f32>,
    documents: Vec<Document>,
    built_at: DateTime<Utc>,
}

impl VectorIndex {
    /// Build from documents and their embeddings. Every vector is normalized
    /// to unit length; an all-zero vector is kept as is and scores 0 against
    /// any query.
    pub fn build(model_id: &str, documents: Vec<Document>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if documents.is_empty() {
            return Err(SearchError::NoDocumentsFound);
        }
        if documents.len() != vectors.len() {
            return Err(SearchError::InvalidInput(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(SearchError::InvalidInput("zero-dimension vectors".into()));
        }

        let mut matrix = Vec::with_capacity(dimension * vectors.len());
        for (i, mut v) in vectors.into_iter().enumerate() {
            if v.len() != dimension {
                return Err(SearchError::InvalidInput(format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    v.len(),
                    dimension
                )));
            }
            normalize(&mut v);
            matrix.extend_from_slice(&v);
        }

        let signature = Signature {
            model_id: model_id.to_string(),
            dimension,
            document_fingerprint: document_fingerprint(&documents),
            document_count: documents.len(),
        };

        Ok(Self {
            signature,
            matrix,
            documents,
            built_at: Utc::now(),
        })
    }

    /// Reassemble a persisted index. `matrix` must already be normalized.
    pub(crate) fn from_parts(
        signature: Signature,
        documents: Vec<Document>,
        matrix: Vec<f32>,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        if documents.len() != signature.document_count
            || matrix.len() != signature.document_count * signature.dimension
        {
            return Err(SearchError::IndexCorrupt(format!(
                "expected {} rows of dimension {}, found {} documents and {} values",
                signature.document_count,
                signature.dimension,
                documents.len(),
                matrix.len()
            )));
        }
        Ok(Self {
            signature,
            matrix,
            documents,
            built_at,
        })
    }

    /// Top `k` documents by inner product with the normalized query, highest
    /// first. Ties keep scan order. `k` is clamped to the index size.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(&Document, f32)>> {
        let dimension = self.signature.dimension;
        if vector.len() != dimension {
            return Err(SearchError::InvalidInput(format!(
                "query has dimension {}, index has {}",
                vector.len(),
                dimension
            )));
        }

        let mut query = vector.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .matrix
            .chunks_exact(dimension)
            .map(|row| dot(row, &query))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k.min(self.len()));

        Ok(scored
            .into_iter()
            .map(|(i, score)| (&self.documents[i], score))
            .collect())
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn dimension(&self) -> usize {
        self.signature.dimension
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.matrix.chunks_exact(self.signature.dimension)
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
