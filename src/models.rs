//! Core data models used throughout the retrieval pipeline.
//!
//! These types represent the documents, chunks, and results that flow
//! from the source provider through chunking, scoring, and fusion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dimensionality of every embedding vector in the pipeline.
pub const EMBEDDING_DIMS: usize = 384;

/// Structural hint for a document, supplied by the source provider.
///
/// A closed tag set: new formats are added by extending the enum, not by
/// runtime shape inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    /// Heading-structured text; split primarily at `#` heading lines.
    Markdown,
    /// Unstructured text or code; split into fixed-size windows.
    PlainText,
}

/// Raw document handed over by the external source provider.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Opaque identifier owned by the source provider.
    pub source: String,
    /// Full raw text (UTF-8).
    pub body: String,
    pub format: FormatHint,
    /// When the document was last indexed; absent means no recency signal.
    pub indexed_at: Option<DateTime<Utc>>,
}

/// The atomic retrievable unit.
///
/// Invariants: `content` is non-empty after trimming, `line_start <=
/// line_end` (1-based, inclusive), and no two chunks of the same source
/// share a `(section, line_start, line_end)` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Identifier of the owning document.
    pub source: String,
    /// Human-readable heading label; empty when the chunk has no heading.
    pub section: String,
    /// Chunk body, including any overlap prefix from the preceding chunk.
    pub content: String,
    pub line_start: u32,
    pub line_end: u32,
    /// Propagated from the owning document's `indexed_at`.
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Final relevance score, `>= 0`, sortable descending.
    pub score: f64,
}
