//! Embedding provider contract and capability selection.
//!
//! The index never embeds text itself. It consumes an [`EmbeddingProvider`]
//! through an [`EmbeddingCapability`], which is either a live provider or an
//! explicit `Unavailable` value recorded when construction failed.

use std::fmt::Display;
use std::sync::Arc;

use super::htp::HtpEmbedder;
use crate::core::config::ModelConfig;
use crate::core::error::{Result, SearchError};

/// Converts text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in snapshot signatures.
    fn model_id(&self) -> &str;

    /// Output dimension; constant for the lifetime of the provider.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in the same order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::ProviderUnavailable("empty embedding response".into()))
    }
}

/// Whether semantic search is possible for this session.
#[derive(Clone)]
pub enum EmbeddingCapability {
    Available(Arc<dyn EmbeddingProvider>),
    Unavailable { reason: String },
}

impl EmbeddingCapability {
    /// Run a provider constructor, turning failure into `Unavailable`.
    pub fn from_factory<P, E, F>(factory: F) -> Self
    where
        P: EmbeddingProvider + 'static,
        E: Display,
        F: FnOnce() -> std::result::Result<P, E>,
    {
        match factory() {
            Ok(provider) => Self::Available(Arc::new(provider)),
            Err(e) => Self::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    /// Select the bundled provider named in the configuration.
    pub fn from_config(model: &ModelConfig) -> Self {
        match model.name.as_str() {
            "htp" => Self::from_factory(|| HtpEmbedder::with_dimension(model.dimension)),
            "none" | "disabled" => Self::Unavailable {
                reason: "semantic search disabled in configuration".to_string(),
            },
            other => Self::Unavailable {
                reason: format!("unknown embedding model: {other}"),
            },
        }
    }

    pub fn provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Available(p) => Some(p),
            Self::Unavailable { .. } => None,
        }
    }
}

impl std::fmt::Debug for EmbeddingCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(p) => f
                .debug_struct("Available")
                .field("model_id", &p.model_id())
                .field("dimension", &p.dimension())
                .finish(),
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 3];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn test_dot() {
        assert!((dot(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(dot(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_from_factory_failure_is_unavailable() {
        let cap = EmbeddingCapability::from_factory(|| -> std::result::Result<HtpEmbedder, String> {
            Err("model download failed".to_string())
        });
        match cap {
            EmbeddingCapability::Unavailable { reason } => assert_eq!(reason, "model download failed"),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_from_config() {
        let cap = EmbeddingCapability::from_config(&ModelConfig::default());
        let provider = cap.provider().expect("htp provider");
        assert_eq!(provider.model_id(), "htp-384");
        assert_eq!(provider.dimension(), 384);

        let none = ModelConfig {
            name: "none".into(),
            dimension: 384,
        };
        assert!(EmbeddingCapability::from_config(&none).provider().is_none());

        let bad_dim = ModelConfig {
            name: "htp".into(),
            dimension: 7,
        };
        assert!(EmbeddingCapability::from_config(&bad_dim).provider().is_none());
    }
}
