//! Query expansion and result ranking.
//!
//! Expansion rewrites an input query into a small, bounded set of
//! variants; both expansion and ranking are pure functions of their
//! inputs, so a search can be replayed and its scores explained.
//!
//! Candidates retrieved under multiple variants are merged by taking the
//! best score across variants, never the sum, so a chunk cannot outrank
//! others just by matching many rewrites of the same question. Table
//! chunks get a bounded additive boost on feature-style queries.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::RankingConfig;
use crate::models::{ChunkKind, QueryVariant, RetrievedChunk, ScoredChunk};

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Release-train versions like 9.4(4) or 8.5(1a)
    RE.get_or_init(|| Regex::new(r"\d+\.\d+\(\d+[a-z]?\)").expect("version pattern is valid"))
}

/// Whether a query asks about features or release deltas.
pub fn is_feature_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    lower.contains("feature")
        || lower.contains("what's new")
        || lower.contains("whats new")
        || lower.contains("new in")
}

/// Expand a query into at most four deterministic variants.
///
/// The original query is always first. Rewrites are added for
/// feature-style phrasing and for an embedded release version, when
/// present.
pub fn expand_query(query: &str) -> Vec<QueryVariant> {
    let mut variants = vec![QueryVariant {
        label: "original",
        text: query.to_string(),
    }];

    if is_feature_query(query) {
        variants.push(QueryVariant {
            label: "feature-table",
            text: format!("{} summary table", query.trim()),
        });
        variants.push(QueryVariant {
            label: "feature-list",
            text: "new software features list".to_string(),
        });
    }

    if let Some(m) = version_re().find(query) {
        variants.push(QueryVariant {
            label: "version",
            text: format!("release notes {}", m.as_str()),
        });
    }

    variants
}

pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Merge per-variant retrievals and produce the final ranked list.
    ///
    /// Ordering is total and deterministic: final score descending, then
    /// tables before prose, then ordinal, then chunk ID.
    pub fn rank(&self, query: &str, retrieved: Vec<RetrievedChunk>) -> Vec<ScoredChunk> {
        let feature_query = is_feature_query(query);

        // Best score per chunk across variants. Iteration order feeds the
        // merge, so ties keep the earliest variant.
        let mut merged: Vec<ScoredChunk> = Vec::new();
        for hit in retrieved {
            match merged.iter_mut().find(|s| s.chunk.id == hit.chunk.id) {
                Some(existing) => {
                    if hit.base_score > existing.base_score {
                        existing.base_score = hit.base_score;
                        existing.winning_variant = hit.variant;
                    }
                }
                None => merged.push(ScoredChunk {
                    base_score: hit.base_score,
                    boost: 0.0,
                    winning_variant: hit.variant,
                    final_score: 0.0,
                    chunk: hit.chunk,
                }),
            }
        }

        for scored in &mut merged {
            scored.boost = self.table_boost(query, feature_query, scored);
            scored.final_score = scored.base_score + scored.boost;
        }

        merged.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.kind.rank().cmp(&b.chunk.kind.rank()))
                .then(a.chunk.ordinal.cmp(&b.chunk.ordinal))
                .then(a.chunk.id.cmp(&b.chunk.id))
        });

        debug!(
            query,
            feature_query,
            results = merged.len(),
            "ranked candidates"
        );

        merged
    }

    /// Additive boost for table chunks on feature queries, clamped to the
    /// configured bounds. Prose chunks and non-feature queries get none.
    fn table_boost(&self, query: &str, feature_query: bool, scored: &ScoredChunk) -> f64 {
        if !feature_query || scored.chunk.kind != ChunkKind::Table {
            return 0.0;
        }

        let matches = matching_terms(query, scored) as f64;
        let boost = self.config.table_boost_min + self.config.term_match_weight * matches;
        boost.clamp(self.config.table_boost_min, self.config.table_boost_max)
    }
}

/// Query terms (length > 2, case-insensitive) found in the chunk's title
/// or category.
fn matching_terms(query: &str, scored: &ScoredChunk) -> usize {
    let title = scored
        .chunk
        .title
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let category = scored
        .chunk
        .category
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    query
        .to_lowercase()
        .split_whitespace()
        .filter(|term| term.len() > 2)
        .filter(|term| title.contains(*term) || category.contains(*term))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn chunk(id: &str, ordinal: i64, kind: ChunkKind, title: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            revision_id: "rev1".to_string(),
            ordinal,
            kind,
            text: format!("chunk {}", id),
            title: title.map(String::from),
            category: None,
            degraded: false,
        }
    }

    fn hit(chunk: Chunk, variant: &'static str, base_score: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk,
            variant,
            base_score,
        }
    }

    fn ranker() -> Ranker {
        Ranker::new(RankingConfig::default())
    }

    #[test]
    fn test_expansion_keeps_original_first_and_is_bounded() {
        let variants = expand_query("what are the new features in 9.4(4)");
        assert_eq!(variants[0].label, "original");
        assert!(variants.len() <= 4);
        assert!(variants.iter().any(|v| v.label == "feature-table"));
        assert!(variants.iter().any(|v| v.label == "version"));
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let a = expand_query("new features overview");
        let b = expand_query("new features overview");
        assert_eq!(a, b);
    }

    #[test]
    fn test_plain_query_gets_no_rewrites() {
        let variants = expand_query("how do I configure zoning");
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].label, "original");
    }

    #[test]
    fn test_feature_query_detection() {
        assert!(is_feature_query("new software features"));
        assert!(is_feature_query("What's new in this release?"));
        assert!(!is_feature_query("upgrade path from 8.4"));
    }

    #[test]
    fn test_merge_takes_max_not_sum() {
        let c = chunk("rev1:0", 0, ChunkKind::Prose, None);
        let ranked = ranker().rank(
            "zoning setup",
            vec![
                hit(c.clone(), "original", 0.4),
                hit(c.clone(), "feature-list", 0.7),
                hit(c, "version", 0.2),
            ],
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].base_score, 0.7);
        assert_eq!(ranked[0].winning_variant, "feature-list");
    }

    #[test]
    fn test_equal_scores_keep_earliest_variant() {
        let c = chunk("rev1:0", 0, ChunkKind::Prose, None);
        let ranked = ranker().rank(
            "zoning setup",
            vec![hit(c.clone(), "original", 0.5), hit(c, "version", 0.5)],
        );
        assert_eq!(ranked[0].winning_variant, "original");
    }

    #[test]
    fn test_no_boost_for_prose_or_plain_queries() {
        let prose = chunk("rev1:0", 0, ChunkKind::Prose, None);
        let table = chunk("rev1:1", 1, ChunkKind::Table, Some("New Software Features"));

        let ranked = ranker().rank(
            "new features",
            vec![hit(prose, "original", 0.5), hit(table.clone(), "original", 0.5)],
        );
        assert_eq!(ranked.iter().find(|s| s.chunk.ordinal == 0).unwrap().boost, 0.0);
        assert!(ranked.iter().find(|s| s.chunk.ordinal == 1).unwrap().boost > 0.0);

        let ranked = ranker().rank("upgrade path", vec![hit(table, "original", 0.5)]);
        assert_eq!(ranked[0].boost, 0.0);
    }

    #[test]
    fn test_boost_stays_within_configured_bounds() {
        let config = RankingConfig::default();
        let table = chunk(
            "rev1:0",
            0,
            ChunkKind::Table,
            Some("new software features table summary list overview matrix"),
        );

        // Many matching terms would overshoot without the clamp
        let ranked = Ranker::new(config.clone()).rank(
            "new software features table summary list overview matrix",
            vec![hit(table.clone(), "original", 0.1)],
        );
        assert!(ranked[0].boost >= config.table_boost_min);
        assert!(ranked[0].boost <= config.table_boost_max);

        // No matching terms still gets the floor
        let bare = chunk("rev1:1", 1, ChunkKind::Table, None);
        let ranked = Ranker::new(config.clone()).rank("features", vec![hit(bare, "original", 0.1)]);
        assert_eq!(ranked[0].boost, config.table_boost_min);
    }

    #[test]
    fn test_tie_break_is_table_then_ordinal_then_id() {
        let ranked = ranker().rank(
            "upgrade path",
            vec![
                hit(chunk("rev1:2", 2, ChunkKind::Prose, None), "original", 0.5),
                hit(chunk("rev1:1", 1, ChunkKind::Table, None), "original", 0.5),
                hit(chunk("rev1:0", 0, ChunkKind::Prose, None), "original", 0.5),
            ],
        );

        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["rev1:1", "rev1:0", "rev1:2"]);
    }

    #[test]
    fn test_ranking_is_deterministic_across_input_order() {
        let hits = vec![
            hit(chunk("rev1:0", 0, ChunkKind::Prose, None), "original", 0.5),
            hit(chunk("rev1:1", 1, ChunkKind::Table, Some("Feature Matrix")), "original", 0.4),
            hit(chunk("rev1:2", 2, ChunkKind::Prose, None), "original", 0.6),
        ];
        let mut reversed = hits.clone();
        reversed.reverse();

        let a: Vec<String> = ranker()
            .rank("feature overview", hits)
            .into_iter()
            .map(|s| s.chunk.id)
            .collect();
        let b: Vec<String> = ranker()
            .rank("feature overview", reversed)
            .into_iter()
            .map(|s| s.chunk.id)
            .collect();
        assert_eq!(a, b);
    }
}
