//! # Retrieval Harness
//!
//! A local-first hybrid retrieval core for heterogeneous document
//! corpora (project docs, runbooks, operational snapshots).
//!
//! The harness splits documents into overlap-preserving chunks, scores
//! them against free-text queries with an IDF-weighted keyword model
//! under recency decay, fuses that with semantic similarity from an
//! injected embedding provider, and caches the expensive vectors on disk
//! behind a content fingerprint so repeated startups are near-instant.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────────┐
//! │ Source docs  │──▶│ Chunker  │──▶│ Chunk set      │
//! └──────────────┘   └──────────┘   └───┬───────┬───┘
//!                                       │       │
//!                              ┌────────┘       └────────┐
//!                              ▼                         ▼
//!                       ┌────────────┐            ┌────────────┐
//!                       │ Keyword    │            │ Vector     │
//!                       │ Ranker     │            │ Cache      │◀─▶ embed()
//!                       └─────┬──────┘            └─────┬──────┘
//!                             └────────┐      ┌─────────┘
//!                                      ▼      ▼
//!                                ┌───────────────┐
//!                                │ Hybrid fusion │──▶ ranked results
//!                                └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use retrieval_harness::{
//!     Config, EmbeddingProvider, FormatHint, HybridRetriever, SourceDocument,
//! };
//!
//! # async fn example(provider: Arc<dyn EmbeddingProvider>) {
//! let retriever = HybridRetriever::new(Config::default(), provider);
//!
//! retriever
//!     .reindex(&[SourceDocument {
//!         source: "runbook.md".to_string(),
//!         body: "# Docker\nrestart the daemon\n".to_string(),
//!         format: FormatHint::Markdown,
//!         indexed_at: None,
//!     }])
//!     .await;
//!
//! // Keyword search is servable immediately; hybrid scoring kicks in
//! // once the background embedding pass delivers.
//! let results = retriever.search("docker", 5).await;
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunker`] | Heading/window splitting with line overlap |
//! | [`cache`] | Fingerprinted on-disk vector cache |
//! | [`ranker`] | IDF keyword scoring with recency decay |
//! | [`embedding`] | Embedding provider seam and vector math |
//! | [`retriever`] | Orchestration, readiness staging, score fusion |

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod models;
pub mod ranker;
pub mod retriever;

pub use cache::{fingerprint, VectorCache, CACHE_FORMAT_VERSION};
pub use chunker::chunk_document;
pub use config::{load_config, Config};
pub use embedding::{cosine_similarity, EmbeddingProvider};
pub use models::{
    Chunk, EmbeddedChunk, FormatHint, SearchResult, SourceDocument, EMBEDDING_DIMS,
};
pub use retriever::{HybridRetriever, IndexStats, SearchOptions};
