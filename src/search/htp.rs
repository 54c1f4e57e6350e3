//! Harmonic Token Projection embedder.
//!
//! Deterministic, training-free text vectors: every token is read as a
//! base-2^16 integer, reduced modulo a set of primes, and each residue is
//! projected onto the unit circle. Token vectors are mean-pooled.
//! See <https://arxiv.org/html/2511.20665>.
//!
//! Needs no model files, so it is the provider used when nothing else is
//! configured.

use std::f64::consts::PI;

use super::embedding::{normalize, EmbeddingProvider};
use crate::core::error::{Result, SearchError};

/// Maximum token length in code points.
const MAX_TOKEN_LENGTH: usize = 64;

/// Pairwise coprime moduli (the first primes). Two output dimensions each.
static PRIMES: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

pub struct HtpEmbedder {
    model_id: String,
    moduli: Vec<u64>,
}

impl HtpEmbedder {
    /// `dimension` must be even and at most twice the number of primes.
    pub fn with_dimension(dimension: usize) -> Result<Self> {
        if dimension == 0 || dimension % 2 != 0 || dimension / 2 > PRIMES.len() {
            return Err(SearchError::ProviderUnavailable(format!(
                "htp dimension must be even and between 2 and {}, got {}",
                PRIMES.len() * 2,
                dimension
            )));
        }
        Ok(Self {
            model_id: format!("htp-{dimension}"),
            moduli: PRIMES[..dimension / 2].to_vec(),
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let dimension = self.moduli.len() * 2;
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; dimension];
        }

        let mut sum = vec![0.0f64; dimension];
        for token in &tokens {
            let n = token_to_integer(token);
            for (i, &m) in self.moduli.iter().enumerate() {
                let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
                sum[2 * i] += theta.sin();
                sum[2 * i + 1] += theta.cos();
            }
        }

        let count = tokens.len() as f64;
        let mut embedding: Vec<f32> = sum.iter().map(|x| (x / count) as f32).collect();
        normalize(&mut embedding);
        embedding
    }
}

impl EmbeddingProvider for HtpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.moduli.len() * 2
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// N = sum(u_j * 2^16^(L-j)), wrapping on overflow.
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

/// Lowercased words split on whitespace and ASCII punctuation.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}
