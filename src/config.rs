use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            overlap_lines: default_overlap_lines(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    2000
}
fn default_overlap_lines() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    #[serde(default = "default_heading_boost")]
    pub heading_boost: f64,
    #[serde(default = "default_coverage_bonus")]
    pub coverage_bonus: f64,
    #[serde(default = "default_tf_saturation")]
    pub tf_saturation: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            heading_boost: default_heading_boost(),
            coverage_bonus: default_coverage_bonus(),
            tf_saturation: default_tf_saturation(),
        }
    }
}

fn default_half_life_days() -> f64 {
    90.0
}
fn default_heading_boost() -> f64 {
    2.0
}
fn default_coverage_bonus() -> f64 {
    0.25
}
fn default_tf_saturation() -> f64 {
    1.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight for semantic vs keyword: `final = (1-α)*keyword + α*semantic`.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_dims() -> usize {
    crate::models::EMBEDDING_DIMS
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/vectors.json")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chunk_chars == 0 {
        anyhow::bail!("chunking.max_chunk_chars must be > 0");
    }

    if config.ranking.half_life_days <= 0.0 {
        anyhow::bail!("ranking.half_life_days must be > 0");
    }

    if config.ranking.heading_boost < 0.0 {
        anyhow::bail!("ranking.heading_boost must be >= 0");
    }

    if config.ranking.coverage_bonus < 0.0 {
        anyhow::bail!("ranking.coverage_bonus must be >= 0");
    }

    if config.ranking.tf_saturation <= 0.0 {
        anyhow::bail!("ranking.tf_saturation must be > 0");
    }

    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}
