//! Fingerprinted on-disk vector cache.
//!
//! Persists the embedding vectors for a chunk set so repeated startups
//! skip recomputation. Validity is keyed on a SHA-256 fingerprint of the
//! chunk set: any content change, reorder, or count change produces a
//! different fingerprint and invalidates the entry wholesale — there is
//! no partial patching.
//!
//! Every read-side failure (missing file, corrupt JSON, version or
//! fingerprint mismatch) is a cache miss, never an error: losing the
//! cache only costs recomputation latency, so it must never block
//! retrieval.
//!
//! The embedding model version is not part of the fingerprint; callers
//! switching models should [`clear`](VectorCache::clear) the cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::{Chunk, EmbeddedChunk};

/// Bumped whenever the persisted layout changes; older entries become
/// misses and are rewritten on the next save.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// The persisted cache shape. Replaced wholesale on every save.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    format_version: u32,
    fingerprint: String,
    chunk_count: usize,
    vectors: Vec<Vec<f32>>,
}

/// Deterministic fingerprint over the ordered `(source, section, content)`
/// triples of a chunk set.
///
/// Each field is prefixed with its byte length (little-endian `u64`), so
/// adjacent fields cannot collide by re-splitting (`"a"+"bc"` hashes
/// differently from `"ab"+"c"`).
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        for field in [&chunk.source, &chunk.section, &chunk.content] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// On-disk cache of embedding vectors for one chunk set.
pub struct VectorCache {
    path: PathBuf,
}

impl VectorCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cached vectors for `chunks`, paired positionally.
    ///
    /// Returns `None` — a miss, never an error — unless all of: the file
    /// exists and deserializes, the format version matches, the
    /// fingerprint matches, and the vector count matches the chunk count.
    pub fn load(&self, chunks: &[Chunk]) -> Option<Vec<EmbeddedChunk>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "vector cache absent");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "vector cache unreadable, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "vector cache corrupt, treating as miss");
                return None;
            }
        };

        if entry.format_version != CACHE_FORMAT_VERSION {
            debug!(
                found = entry.format_version,
                expected = CACHE_FORMAT_VERSION,
                "vector cache format version mismatch"
            );
            return None;
        }

        if entry.fingerprint != fingerprint(chunks) {
            debug!("vector cache fingerprint mismatch, chunk set changed");
            return None;
        }

        if entry.chunk_count != chunks.len() || entry.vectors.len() != chunks.len() {
            warn!(
                entry_count = entry.chunk_count,
                vectors = entry.vectors.len(),
                chunks = chunks.len(),
                "vector cache count mismatch, treating as miss"
            );
            return None;
        }

        Some(
            chunks
                .iter()
                .cloned()
                .zip(entry.vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                .collect(),
        )
    }

    /// Persist vectors for `chunks`, replacing any previous entry.
    ///
    /// The fingerprint is recomputed at save time. The entry is written
    /// to a `.tmp` sibling and renamed into place, so a crash mid-write
    /// cannot leave a file that validates.
    pub fn save(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        anyhow::ensure!(
            chunks.len() == vectors.len(),
            "vector count {} does not match chunk count {}",
            vectors.len(),
            chunks.len()
        );

        let entry = CacheEntry {
            format_version: CACHE_FORMAT_VERSION,
            fingerprint: fingerprint(chunks),
            chunk_count: chunks.len(),
            vectors: vectors.to_vec(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }
        }

        let tmp = tmp_path(&self.path);
        let json = serde_json::to_string(&entry)?;
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;

        debug!(path = %self.path.display(), chunks = chunks.len(), "vector cache saved");
        Ok(())
    }

    /// Delete the persisted entry if present; returns whether anything
    /// was deleted. Idempotent.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to delete cache file: {}", self.path.display())
            }),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, section: &str, content: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            section: section.to_string(),
            content: content.to_string(),
            line_start: 1,
            line_end: 1,
            indexed_at: None,
        }
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| vec![i as f32 + 0.125, -2.5, 3.0625])
            .collect()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let chunks = vec![chunk("a", "s", "one"), chunk("b", "t", "two")];
        assert_eq!(fingerprint(&chunks), fingerprint(&chunks));
    }

    #[test]
    fn test_fingerprint_changes_on_single_character_edit() {
        let before = vec![chunk("a", "s", "one"), chunk("b", "t", "two")];
        let after = vec![chunk("a", "s", "one"), chunk("b", "t", "two!")];
        assert_ne!(fingerprint(&before), fingerprint(&after));
    }

    #[test]
    fn test_fingerprint_changes_on_reorder() {
        let forward = vec![chunk("a", "s", "one"), chunk("b", "t", "two")];
        let reversed = vec![chunk("b", "t", "two"), chunk("a", "s", "one")];
        assert_ne!(fingerprint(&forward), fingerprint(&reversed));
    }

    #[test]
    fn test_fingerprint_field_boundaries_are_unambiguous() {
        let left = vec![chunk("a", "bc", "x")];
        let right = vec![chunk("ab", "c", "x")];
        assert_ne!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn test_load_misses_on_absent_file() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("vectors.json"));
        assert!(cache.load(&[chunk("a", "", "text")]).is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("vectors.json"));
        let chunks = vec![chunk("a", "s", "one"), chunk("b", "t", "two")];
        let vecs = vectors(2);

        cache.save(&chunks, &vecs).unwrap();
        let loaded = cache.load(&chunks).expect("expected a cache hit");

        assert_eq!(loaded.len(), 2);
        for (embedded, (chunk, vector)) in loaded.iter().zip(chunks.iter().zip(vecs.iter())) {
            assert_eq!(&embedded.chunk, chunk);
            for (a, b) in embedded.vector.iter().zip(vector.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_load_misses_after_content_change() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("vectors.json"));
        let chunks = vec![chunk("a", "s", "one")];
        cache.save(&chunks, &vectors(1)).unwrap();

        let changed = vec![chunk("a", "s", "one changed")];
        assert!(cache.load(&changed).is_none());
    }

    #[test]
    fn test_load_misses_on_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let cache = VectorCache::new(&path);
        assert!(cache.load(&[chunk("a", "", "text")]).is_none());
    }

    #[test]
    fn test_load_misses_on_version_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        let chunks = vec![chunk("a", "", "text")];

        let stale = serde_json::json!({
            "format_version": CACHE_FORMAT_VERSION + 1,
            "fingerprint": fingerprint(&chunks),
            "chunk_count": 1,
            "vectors": [[0.5, 0.25]],
        });
        std::fs::write(&path, stale.to_string()).unwrap();

        let cache = VectorCache::new(&path);
        assert!(cache.load(&chunks).is_none());
    }

    #[test]
    fn test_load_misses_on_count_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        let chunks = vec![chunk("a", "", "text")];

        let inconsistent = serde_json::json!({
            "format_version": CACHE_FORMAT_VERSION,
            "fingerprint": fingerprint(&chunks),
            "chunk_count": 2,
            "vectors": [[0.5, 0.25]],
        });
        std::fs::write(&path, inconsistent.to_string()).unwrap();

        let cache = VectorCache::new(&path);
        assert!(cache.load(&chunks).is_none());
    }

    #[test]
    fn test_save_replaces_wholesale_and_leaves_no_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        let cache = VectorCache::new(&path);

        let old_chunks = vec![chunk("a", "s", "old")];
        cache.save(&old_chunks, &vectors(1)).unwrap();

        let new_chunks = vec![chunk("a", "s", "new"), chunk("b", "t", "also new")];
        cache.save(&new_chunks, &vectors(2)).unwrap();

        assert!(cache.load(&old_chunks).is_none());
        assert_eq!(cache.load(&new_chunks).unwrap().len(), 2);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_save_rejects_mismatched_lengths() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("vectors.json"));
        let chunks = vec![chunk("a", "s", "one"), chunk("b", "t", "two")];
        assert!(cache.save(&chunks, &vectors(1)).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("vectors.json"));
        let chunks = vec![chunk("a", "s", "one")];

        assert!(!cache.clear().unwrap());
        cache.save(&chunks, &vectors(1)).unwrap();
        assert!(cache.clear().unwrap());
        assert!(!cache.clear().unwrap());
        assert!(cache.load(&chunks).is_none());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::new(tmp.path().join("nested/dir/vectors.json"));
        let chunks = vec![chunk("a", "s", "one")];
        cache.save(&chunks, &vectors(1)).unwrap();
        assert!(cache.load(&chunks).is_some());
    }
}
