//! Text embeddings for the local semantic index
//!
//! Only the hashing TF-IDF embedder ships today. Vectors are persisted, so an
//! embedder must be deterministic across processes and platforms.

mod tfidf;

pub use tfidf::TfIdfEmbedder;

use std::sync::Arc;

use crate::error::{MemError, Result};

/// Dimensions used by the default embedder
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Build the embedder registered under `model`
pub fn create_embedder(model: &str) -> Result<Arc<dyn Embedder>> {
    match model.trim().to_lowercase().as_str() {
        "tfidf" | "local" => Ok(Arc::new(TfIdfEmbedder::new(DEFAULT_DIMENSIONS))),
        other => Err(MemError::Config(format!(
            "Unknown embedding model: '{}'. Use 'tfidf'",
            other
        ))),
    }
}

/// Cosine similarity in `[-1, 1]`; mismatched or zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
