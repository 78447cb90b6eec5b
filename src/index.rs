//! Similarity index boundary.
//!
//! The pipeline talks to an external embedding/vector index only through
//! [`VectorIndex`]. The trait keeps index failures out of the ledger's
//! failure domain: an upsert that fails leaves the revision committed and
//! searchable later, never half-ingested.
//!
//! [`MemoryIndex`] is an in-process implementation with deterministic
//! token-overlap scoring. It backs tests and small deployments that do
//! not run a real vector store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::IndexEntry;

/// One match returned by a similarity query.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub chunk_id: String,
    /// Similarity in `[0, 1]`, higher is closer.
    pub score: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries, keyed by chunk ID.
    async fn upsert(&self, entries: &[IndexEntry]) -> anyhow::Result<()>;

    /// Remove entries by chunk ID. Unknown IDs are ignored.
    async fn remove(&self, chunk_ids: &[String]) -> anyhow::Result<()>;

    /// Top-`k` entries most similar to `text`.
    async fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<SimilarityHit>>;
}

/// In-process index scoring by token overlap.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(String::from)
        .collect()
}

/// Fraction of query tokens present in the entry text.
fn overlap_score(query: &HashSet<String>, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let entry = tokens(text);
    let shared = query.iter().filter(|t| entry.contains(*t)).count();
    shared as f64 / query.len() as f64
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> anyhow::Result<()> {
        let mut map = self.entries.write().await;
        for entry in entries {
            map.insert(entry.chunk_id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn remove(&self, chunk_ids: &[String]) -> anyhow::Result<()> {
        let mut map = self.entries.write().await;
        for id in chunk_ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<SimilarityHit>> {
        let query = tokens(text);
        let map = self.entries.read().await;

        let mut hits: Vec<SimilarityHit> = map
            .values()
            .map(|entry| SimilarityHit {
                chunk_id: entry.chunk_id.clone(),
                score: overlap_score(&query, &entry.text),
            })
            .filter(|h| h.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn entry(chunk_id: &str, text: &str) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            text: text.to_string(),
            kind: ChunkKind::Prose,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_token_overlap() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                entry("a", "zoning configuration for the fabric switch"),
                entry("b", "new software features in this release"),
                entry("c", "hardware installation guide"),
            ])
            .await
            .unwrap();

        let hits = index.query("new software features", 10).await.unwrap();
        assert_eq!(hits[0].chunk_id, "b");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_query_is_deterministic_with_tied_scores() {
        let index = MemoryIndex::new();
        index
            .upsert(&[entry("b", "shared words here"), entry("a", "shared words here")])
            .await
            .unwrap();

        let hits = index.query("shared words", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_remove_deletes() {
        let index = MemoryIndex::new();
        index.upsert(&[entry("a", "old text about zoning")]).await.unwrap();
        index.upsert(&[entry("a", "completely different words")]).await.unwrap();

        let hits = index.query("zoning", 10).await.unwrap();
        assert!(hits.is_empty());

        index.remove(&["a".to_string()]).await.unwrap();
        let hits = index.query("completely different", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                entry("a", "release notes overview"),
                entry("b", "release notes details"),
                entry("c", "release notes appendix"),
            ])
            .await
            .unwrap();

        let hits = index.query("release notes", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
