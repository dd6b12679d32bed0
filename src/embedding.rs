//! Embedding provider seam and vector math.
//!
//! The embedding model is an external collaborator: the retriever only
//! knows the [`EmbeddingProvider`] trait. Implementations wrap whatever
//! backend produces the fixed-length vectors (a local model, a remote
//! API); the core never constructs one itself.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Chunk;

/// A black-box text-to-vector function.
///
/// Assumed pure for a fixed model version (same text always yields the
/// same vector) and never invoked with empty text — the chunk
/// non-emptiness invariant upholds that on the caller side.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a single text into a `dims()`-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// The text handed to the provider for a chunk: the section label and
/// content together when a label exists, so heading signal reaches the
/// vector, else the content alone.
pub fn embedding_text(chunk: &Chunk) -> String {
    if chunk.section.is_empty() {
        chunk.content.clone()
    } else {
        format!("{}\n{}", chunk.section, chunk.content)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
