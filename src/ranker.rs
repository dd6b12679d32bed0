//! IDF-weighted keyword scoring with recency decay.
//!
//! Scores a query against a chunk collection using inverse document
//! frequency over the collection being searched, a saturating term
//! frequency (diminishing returns against keyword stuffing), a heading
//! boost for matches inside the section label, a bonus for matching more
//! distinct query terms, and a half-life decay multiplier favoring
//! recently indexed chunks.
//!
//! Scoring is deterministic: the caller supplies `now`, so decay does not
//! depend on wall-clock reads inside the ranker.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::RankingConfig;
use crate::models::{Chunk, SearchResult};

/// Lowercase, split on non-alphanumeric boundaries, drop tokens shorter
/// than 2 characters. Applied identically to queries and chunk text.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// Score every chunk against the query, aligned positionally with
/// `chunks`. Chunks matching no query term score `0.0`. An empty or
/// whitespace-only query scores everything `0.0`.
pub fn score_chunks(
    query: &str,
    chunks: &[Chunk],
    cfg: &RankingConfig,
    now: DateTime<Utc>,
) -> Vec<f64> {
    let query_terms = distinct_terms(query);
    if query_terms.is_empty() || chunks.is_empty() {
        return vec![0.0; chunks.len()];
    }

    let stats: Vec<ChunkStats> = chunks.iter().map(ChunkStats::build).collect();

    // Document frequency over the collection being searched: a chunk
    // counts once per term whether it appears in content or section.
    let mut df: HashMap<&str, usize> = HashMap::new();
    for stat in &stats {
        for term in stat.terms() {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let n = chunks.len() as f64;
    let q = query_terms.len() as f64;

    chunks
        .iter()
        .zip(stats.iter())
        .map(|(chunk, stat)| {
            let mut raw = 0.0;
            let mut matched = 0usize;

            for term in &query_terms {
                let f_content = stat.content_tf.get(term.as_str()).copied().unwrap_or(0);
                let f_section = stat.section_tf.get(term.as_str()).copied().unwrap_or(0);
                if f_content == 0 && f_section == 0 {
                    continue;
                }
                // Terms absent from the corpus never reach here: a match
                // in this chunk implies df >= 1.
                let term_df = df.get(term.as_str()).copied().unwrap_or(1) as f64;
                let idf = (1.0 + n / term_df).ln();

                raw += idf
                    * (saturate(f_content, cfg.tf_saturation)
                        + cfg.heading_boost * saturate(f_section, cfg.tf_saturation));
                matched += 1;
            }

            if matched == 0 {
                return 0.0;
            }

            let coverage = 1.0 + cfg.coverage_bonus * ((matched as f64 - 1.0) / q);
            raw * coverage * decay_factor(chunk.indexed_at, now, cfg.half_life_days)
        })
        .collect()
}

/// Rank chunks by keyword relevance, descending.
///
/// Zero-scoring chunks are excluded; ties keep first-seen chunk order.
/// Empty query or a query matching nothing yields an empty result.
pub fn rank(
    query: &str,
    chunks: &[Chunk],
    cfg: &RankingConfig,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    let scores = score_chunks(query, chunks, cfg, now);

    let mut results: Vec<SearchResult> = chunks
        .iter()
        .zip(scores.iter())
        .filter(|(_, score)| **score > 0.0)
        .map(|(chunk, score)| SearchResult {
            chunk: chunk.clone(),
            score: *score,
        })
        .collect();

    // Stable sort: equal scores keep input order.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    results
}

/// Saturating term frequency: `f / (f + k)`, so repeated occurrences
/// yield diminishing returns instead of growing linearly.
fn saturate(f: u32, k: f64) -> f64 {
    if f == 0 {
        return 0.0;
    }
    let f = f as f64;
    f / (f + k)
}

/// Half-life decay: `0.5 ^ (age_days / half_life_days)`.
///
/// Chunks without an `indexed_at` timestamp receive factor `1.0` — no
/// recency signal is never treated as a penalty.
fn decay_factor(indexed_at: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    match indexed_at {
        None => 1.0,
        Some(ts) => {
            let age_secs = (now - ts).num_seconds().max(0) as f64;
            let age_days = age_secs / 86_400.0;
            0.5_f64.powf(age_days / half_life_days)
        }
    }
}

/// Distinct query terms in first-seen order.
fn distinct_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Term frequencies of one chunk, content and section kept separate so
/// heading matches can be weighted more heavily.
struct ChunkStats {
    content_tf: HashMap<String, u32>,
    section_tf: HashMap<String, u32>,
}

impl ChunkStats {
    fn build(chunk: &Chunk) -> Self {
        Self {
            content_tf: term_freq(&chunk.content),
            section_tf: term_freq(&chunk.section),
        }
    }

    fn terms(&self) -> HashSet<&str> {
        self.content_tf
            .keys()
            .chain(self.section_tf.keys())
            .map(|s| s.as_str())
            .collect()
    }
}

fn term_freq(text: &str) -> HashMap<String, u32> {
    let mut freq = HashMap::new();
    for token in tokenize(text) {
        *freq.entry(token).or_insert(0) += 1;
    }
    freq
}
