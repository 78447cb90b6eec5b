use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target size for prose chunks, in bytes.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Overlap window between consecutive prose chunks, drawn only from
    /// the same non-table region.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Hard ceiling for table chunks. A table region above this is
    /// truncated and flagged degraded, never split.
    #[serde(default = "default_table_max_chars")]
    pub table_max_chars: usize,
    /// Heading keywords that introduce structured content.
    #[serde(default = "default_table_keywords")]
    pub table_keywords: Vec<String>,
    /// Category labels recognized as sub-headings inside a table region.
    #[serde(default = "default_category_labels")]
    pub category_labels: Vec<String>,
    /// Consecutive separator rows required to start a table region
    /// without a keyword heading.
    #[serde(default = "default_min_table_rows")]
    pub min_table_rows: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            table_max_chars: default_table_max_chars(),
            table_keywords: default_table_keywords(),
            category_labels: default_category_labels(),
            min_table_rows: default_min_table_rows(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}
fn default_table_max_chars() -> usize {
    2000
}
fn default_table_keywords() -> Vec<String> {
    vec![
        "features".to_string(),
        "table".to_string(),
        "matrix".to_string(),
    ]
}
fn default_category_labels() -> Vec<String> {
    vec![
        "Ease of Use".to_string(),
        "Feature Set".to_string(),
        "Interoperability".to_string(),
        "Security".to_string(),
    ]
}
fn default_min_table_rows() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Lower bound of the additive table boost.
    #[serde(default = "default_table_boost_min")]
    pub table_boost_min: f64,
    /// Upper bound of the additive table boost.
    #[serde(default = "default_table_boost_max")]
    pub table_boost_max: f64,
    /// Boost increment per query term matching the table's title or category.
    #[serde(default = "default_term_match_weight")]
    pub term_match_weight: f64,
    /// Candidates requested from the index per query variant.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Final result count returned by a search.
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            table_boost_min: default_table_boost_min(),
            table_boost_max: default_table_boost_max(),
            term_match_weight: default_term_match_weight(),
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_table_boost_min() -> f64 {
    0.5
}
fn default_table_boost_max() -> f64 {
    2.0
}
fn default_term_match_weight() -> f64 {
    0.3
}
fn default_candidate_k() -> usize {
    30
}
fn default_final_limit() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.chunking.table_max_chars < config.chunking.max_chars {
        anyhow::bail!("chunking.table_max_chars must be >= chunking.max_chars");
    }

    if config.chunking.min_table_rows < 2 {
        anyhow::bail!("chunking.min_table_rows must be >= 2");
    }

    if config.ranking.table_boost_min < 0.0 {
        anyhow::bail!("ranking.table_boost_min must be >= 0");
    }

    if config.ranking.table_boost_max < config.ranking.table_boost_min {
        anyhow::bail!("ranking.table_boost_max must be >= ranking.table_boost_min");
    }

    if config.ranking.term_match_weight < 0.0 {
        anyhow::bail!("ranking.term_match_weight must be >= 0");
    }

    if config.ranking.candidate_k == 0 {
        anyhow::bail!("ranking.candidate_k must be >= 1");
    }

    if config.ranking.final_limit == 0 {
        anyhow::bail!("ranking.final_limit must be >= 1");
    }

    Ok(())
}
