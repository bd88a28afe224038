//! Feature-hashing embedder.
//!
//! Each lowercase token and each adjacent token pair is hashed with SHA-256
//! into one of `dims` buckets with a sign bit. Texts that share words land
//! near each other, which is enough for offline runs and tests. Output is
//! deterministic across processes and platforms.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

pub const DEFAULT_DIMS: usize = 256;

pub struct HashedProvider {
    dims: usize,
}

impl HashedProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            // Blank text still needs a non-zero vector to normalize.
            self.bump(&mut v, "\u{0}empty", 1.0);
            return v;
        }
        for token in &tokens {
            self.bump(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.bump(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        v
    }

    fn bump(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket % self.dims] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
