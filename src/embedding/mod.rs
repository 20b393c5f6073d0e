//! Embedding generation.
//!
//! The core treats the embedder as an opaque pure function `text -> vector`.
//! [`TfIdfEmbedder`] is the bundled implementation: deterministic, fast, and
//! free of any external API dependency.

mod tfidf;

pub use tfidf::TfIdfEmbedder;

use crate::error::Result;

/// A text embedder producing fixed-dimension, unit-normalized vectors.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. The default falls back to one call per text;
    /// implementations with a genuine batched backend should override this.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched
/// lengths, empty vectors, or either vector having zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
