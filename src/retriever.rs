//! Hybrid retrieval orchestration.
//!
//! Fuses keyword and semantic relevance over a chunk collection that is
//! rebuilt once per reindex, tolerating an embedding subsystem that is
//! unavailable or still warming up.
//!
//! ```text
//! reindex(docs) ──▶ chunker ──▶ chunk collection      keyword_ready
//!                                    │
//!                          cache.load(chunks)
//!                         hit ╱           ╲ miss
//!                 vectors installed   background embed ──▶ channel
//!                 semantic_ready      (cache.save on success)
//! ```
//!
//! Start-up staging: keyword search is servable the instant chunking
//! completes; embedding happens in the background and delivers its
//! result over a channel that [`search`](HybridRetriever::search) drains
//! without blocking. Queries issued before the vectors arrive degrade to
//! keyword-only scoring; once the delivery is polled in, subsequent
//! queries score hybrid. A reindex bumps an epoch counter, so a late
//! delivery for a superseded chunk set is dropped on the floor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::VectorCache;
use crate::chunker::chunk_document;
use crate::config::Config;
use crate::embedding::{cosine_similarity, embedding_text, EmbeddingProvider};
use crate::models::{Chunk, SearchResult, SourceDocument};
use crate::ranker;

/// Options for [`HybridRetriever::search_with_options`].
#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    /// Maximum results to return; `<= 0` yields an empty result.
    pub top_k: i64,
    /// Only rank chunks from this source document.
    pub source: Option<String>,
}

/// Snapshot of index and readiness state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub keyword_ready: bool,
    pub semantic_ready: bool,
    /// True when the embedding pass for the current chunk set failed;
    /// the session stays keyword-only.
    pub semantic_failed: bool,
}

/// Completed (or failed) background embedding pass, tagged with the
/// reindex epoch it belongs to.
enum EmbedOutcome {
    Ready { epoch: u64, vectors: Vec<Vec<f32>> },
    Failed { epoch: u64 },
}

struct IndexState {
    documents: usize,
    chunks: Arc<Vec<Chunk>>,
    vectors: Option<Arc<Vec<Vec<f32>>>>,
}

/// Orchestrates chunking, caching, keyword ranking, and score fusion.
pub struct HybridRetriever {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    cache: VectorCache,
    state: RwLock<IndexState>,
    keyword_ready: AtomicBool,
    semantic_ready: AtomicBool,
    semantic_failed: AtomicBool,
    epoch: AtomicU64,
    tx: mpsc::UnboundedSender<EmbedOutcome>,
    rx: Mutex<mpsc::UnboundedReceiver<EmbedOutcome>>,
}

impl HybridRetriever {
    pub fn new(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        if provider.dims() != config.embedding.dims {
            warn!(
                provider = provider.dims(),
                configured = config.embedding.dims,
                "embedding provider dimensionality differs from configuration"
            );
        }
        let cache = VectorCache::new(config.cache.path.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            provider,
            cache,
            state: RwLock::new(IndexState {
                documents: 0,
                chunks: Arc::new(Vec::new()),
                vectors: None,
            }),
            keyword_ready: AtomicBool::new(false),
            semantic_ready: AtomicBool::new(false),
            semantic_failed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Rebuild the chunk collection from `documents`.
    ///
    /// Keyword search is servable as soon as this returns. Vectors come
    /// from the cache when the fingerprint matches; otherwise a
    /// background embedding pass is spawned and queries keep degrading
    /// to keyword-only until it delivers.
    pub async fn reindex(&self, documents: &[SourceDocument]) {
        let mut chunks = Vec::new();
        for doc in documents {
            chunks.extend(chunk_document(doc, &self.config.chunking));
        }
        let chunks = Arc::new(chunks);

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().unwrap();
            state.documents = documents.len();
            state.chunks = chunks.clone();
            state.vectors = None;
        }
        self.semantic_ready.store(false, Ordering::SeqCst);
        self.semantic_failed.store(false, Ordering::SeqCst);
        self.keyword_ready.store(true, Ordering::SeqCst);
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "reindex complete, keyword search ready"
        );

        if chunks.is_empty() {
            let mut state = self.state.write().unwrap();
            state.vectors = Some(Arc::new(Vec::new()));
            drop(state);
            self.semantic_ready.store(true, Ordering::SeqCst);
            return;
        }

        if let Some(embedded) = self.cache.load(&chunks) {
            let vectors: Vec<Vec<f32>> = embedded.into_iter().map(|e| e.vector).collect();
            let mut state = self.state.write().unwrap();
            state.vectors = Some(Arc::new(vectors));
            drop(state);
            self.semantic_ready.store(true, Ordering::SeqCst);
            debug!("vector cache hit, semantic search ready");
            return;
        }

        let provider = self.provider.clone();
        let tx = self.tx.clone();
        let cache_path = self.cache.path().to_path_buf();
        let batch_size = self.config.embedding.batch_size;
        tokio::spawn(async move {
            match embed_all(provider.as_ref(), &chunks, batch_size).await {
                Ok(vectors) => {
                    if let Err(e) = VectorCache::new(cache_path).save(&chunks, &vectors) {
                        warn!(error = %e, "failed to persist vector cache");
                    }
                    let _ = tx.send(EmbedOutcome::Ready { epoch, vectors });
                }
                Err(e) => {
                    warn!(error = %e, "embedding pass failed, session stays keyword-only");
                    let _ = tx.send(EmbedOutcome::Failed { epoch });
                }
            }
        });
    }

    /// Search with default options.
    pub async fn search(&self, query: &str, top_k: i64) -> Vec<SearchResult> {
        self.search_with_options(
            query,
            SearchOptions {
                top_k,
                source: None,
            },
        )
        .await
    }

    /// Rank chunks against `query`, fusing keyword and semantic scores.
    ///
    /// Degenerate inputs (`top_k <= 0`, blank query, nothing matching)
    /// yield an empty result, never an error. A query-embedding failure
    /// degrades that query to keyword-only scoring.
    pub async fn search_with_options(&self, query: &str, opts: SearchOptions) -> Vec<SearchResult> {
        self.poll_embeddings();

        if opts.top_k <= 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let (chunks, vectors) = {
            let state = self.state.read().unwrap();
            (state.chunks.clone(), state.vectors.clone())
        };

        // Candidate set, with original indices for vector lookup.
        let filtered: Vec<Chunk>;
        let original_index: Vec<usize>;
        let candidates: &[Chunk] = match &opts.source {
            None => {
                original_index = (0..chunks.len()).collect();
                chunks.as_slice()
            }
            Some(source) => {
                let keep: Vec<usize> = chunks
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| &c.source == source)
                    .map(|(i, _)| i)
                    .collect();
                filtered = keep.iter().map(|&i| chunks[i].clone()).collect();
                original_index = keep;
                &filtered
            }
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        let keyword_scores =
            ranker::score_chunks(query, candidates, &self.config.ranking, Utc::now());

        let semantic_scores: Option<Vec<f64>> = match (&vectors, self.semantic_ready()) {
            (Some(vectors), true) => match self.provider.embed(query).await {
                Ok(query_vec) => Some(
                    original_index
                        .iter()
                        .map(|&i| cosine_similarity(&query_vec, &vectors[i]) as f64)
                        .collect(),
                ),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, degrading to keyword-only");
                    None
                }
            },
            _ => None,
        };

        let keyword_norm = scale_by_max(&keyword_scores);
        let alpha = match &semantic_scores {
            Some(_) => self.config.retrieval.hybrid_alpha,
            None => 0.0,
        };
        let semantic_norm = semantic_scores.as_deref().map(min_max_normalize);

        struct Scored {
            index: usize,
            fused: f64,
            keyword: f64,
        }

        let mut scored: Vec<Scored> = (0..candidates.len())
            .map(|i| {
                let semantic = semantic_norm.as_ref().map_or(0.0, |s| s[i]);
                Scored {
                    index: i,
                    fused: (1.0 - alpha) * keyword_norm[i] + alpha * semantic,
                    keyword: keyword_scores[i],
                }
            })
            .filter(|s| s.fused > 0.0)
            .collect();

        // Final desc, then keyword score desc; the stable sort keeps
        // first-seen order for full ties.
        scored.sort_by(|a, b| {
            b.fused
                .partial_cmp(&a.fused)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.keyword
                        .partial_cmp(&a.keyword)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        scored.truncate(opts.top_k as usize);

        scored
            .into_iter()
            .map(|s| SearchResult {
                chunk: candidates[s.index].clone(),
                score: s.fused,
            })
            .collect()
    }

    /// True once the chunk collection for the last reindex is built.
    pub fn keyword_ready(&self) -> bool {
        self.keyword_ready.load(Ordering::SeqCst)
    }

    /// True once vectors are loaded from cache or freshly computed.
    pub fn semantic_ready(&self) -> bool {
        self.poll_embeddings();
        self.semantic_ready.load(Ordering::SeqCst)
    }

    /// Poll until semantic search is ready, the embedding pass fails, or
    /// the timeout elapses. Returns the final readiness state.
    pub async fn wait_semantic_ready(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.semantic_ready() {
                return true;
            }
            if self.semantic_failed.load(Ordering::SeqCst) {
                return false;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.poll_embeddings();
        let state = self.state.read().unwrap();
        IndexStats {
            documents: state.documents,
            chunks: state.chunks.len(),
            keyword_ready: self.keyword_ready.load(Ordering::SeqCst),
            semantic_ready: self.semantic_ready.load(Ordering::SeqCst),
            semantic_failed: self.semantic_failed.load(Ordering::SeqCst),
        }
    }

    /// Delete the persisted vector cache entry; returns whether anything
    /// was deleted.
    pub fn clear_cache(&self) -> anyhow::Result<bool> {
        self.cache.clear()
    }

    /// Drain completed background deliveries without blocking. Stale
    /// epochs (superseded by a newer reindex) are dropped.
    fn poll_embeddings(&self) {
        let mut rx = self.rx.lock().unwrap();
        while let Ok(outcome) = rx.try_recv() {
            let current = self.epoch.load(Ordering::SeqCst);
            match outcome {
                EmbedOutcome::Ready { epoch, vectors } if epoch == current => {
                    let mut state = self.state.write().unwrap();
                    state.vectors = Some(Arc::new(vectors));
                    drop(state);
                    self.semantic_ready.store(true, Ordering::SeqCst);
                    debug!("embedding pass delivered, semantic search ready");
                }
                EmbedOutcome::Failed { epoch } if epoch == current => {
                    self.semantic_failed.store(true, Ordering::SeqCst);
                }
                EmbedOutcome::Ready { epoch, .. } | EmbedOutcome::Failed { epoch } => {
                    debug!(epoch, current, "dropping stale embedding delivery");
                }
            }
        }
    }
}

/// Embed every chunk in order, in batches sized for progress reporting.
/// Any provider failure aborts the whole pass.
async fn embed_all(
    provider: &dyn EmbeddingProvider,
    chunks: &[Chunk],
    batch_size: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        for chunk in batch {
            vectors.push(provider.embed(&embedding_text(chunk)).await?);
        }
        debug!(
            embedded = vectors.len(),
            total = chunks.len(),
            "embedding progress"
        );
    }
    Ok(vectors)
}

/// Scale scores into `[0, 1]` by dividing by the maximum.
///
/// The zero floor is fixed: a chunk matching nothing keeps score `0.0`
/// rather than being re-based, so the lowest-scoring real match is not
/// squashed to zero. All-zero input stays all-zero.
fn scale_by_max(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s / max).collect()
}

/// Min-max normalize to `[0, 1]`.
///
/// An all-equal set normalizes to `1.0` when the shared value is
/// positive, `0.0` otherwise — a corpus uniformly dissimilar to the
/// query carries no semantic signal.
fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        let level = if max > 0.0 { 1.0 } else { 0.0 };
        return vec![level; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}
