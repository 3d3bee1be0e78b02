//! Text embedding backends for the knowledge store.

use sha2::{Digest, Sha256};

/// Maps text to a fixed-width vector.
pub trait Embedder {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Deterministic, local embedder based on signed feature hashing.
///
/// Each lowercase alphanumeric token is hashed with SHA-256; the digest picks
/// a bucket and a sign. The vector is L2-normalized, so texts sharing
/// vocabulary score higher under cosine similarity. No network access.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            out[bucket] += sign;
        }
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::similarity::cosine_similarity;

    #[test]
    fn embedding_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Build a todo app");
        let b = embedder.embed("build a TODO app");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed("weather app with forecasts");
        let related = embedder.embed("a weather forecasts dashboard app");
        let unrelated = embedder.embed("kernel scheduler latency tuning");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed("  ... ").iter().all(|v| *v == 0.0));
        assert_eq!(embedder.dimensions(), 8);
    }
}
