//! Hashing TF-IDF embedder
//!
//! Tokens and bigrams are hashed into a fixed number of signed buckets with
//! 64-bit FNV-1a, which is stable across Rust versions and platforms. The
//! result is L2 normalized.

use std::collections::BTreeMap;

use crate::embedding::Embedder;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bigram weight relative to single tokens
const BIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    bytes.iter().fold(FNV_OFFSET ^ seed, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Feature-hashing embedder with TF-IDF style weights
pub struct TfIdfEmbedder {
    dimensions: usize,
}

impl TfIdfEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Lowercase alphanumeric runs longer than one character
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 1)
            .map(String::from)
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let idx = (fnv1a(feature.as_bytes(), 0) % self.dimensions as u64) as usize;
        let sign = if fnv1a(feature.as_bytes(), 0x9e37_79b9) & 1 == 0 {
            1.0
        } else {
            -1.0
        };
        (idx, sign)
    }
}

impl Embedder for TfIdfEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        // Ordered map keeps float accumulation order fixed
        let mut tf: BTreeMap<&str, f32> = BTreeMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (token, count) in tf {
            let tf_score = (1.0 + count / doc_len).ln();
            // Longer tokens stand in for rarer ones
            let idf_score = 1.0 + (token.len() as f32 * 0.1);

            let (idx, sign) = self.bucket(token);
            embedding[idx] += tf_score * idf_score * sign;
        }

        for window in tokens.windows(2) {
            let bigram = format!("{}_{}", window[0], window[1]);
            let (idx, sign) = self.bucket(&bigram);
            embedding[idx] += BIGRAM_WEIGHT * sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "tfidf"
    }
}
