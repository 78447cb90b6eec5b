//! End-to-end ingestion and search pipeline.
//!
//! `ingest_document` runs ledger promotion, chunking, chunk persistence,
//! and index upsert in that order. The index write is outside the
//! durability boundary: a failed upsert is logged and reported in the
//! outcome, but the revision stays committed and can be re-indexed later.
//!
//! `search` expands the query, fans out to the index per variant, loads
//! candidate chunks while dropping any whose revision is no longer
//! current, and ranks the survivors. Stale index entries are filtered at
//! query time rather than eagerly deleted on promotion.

use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use anyhow::Context;

use crate::chunker::Chunker;
use crate::config::{Config, RankingConfig};
use crate::index::VectorIndex;
use crate::ledger::RevisionLedger;
use crate::models::{
    Chunk, ChunkKind, IndexEntry, IngestOutcome, RetrievedChunk, ScoredChunk, SweepOutcome,
};
use crate::ranker::{expand_query, Ranker};

pub struct Pipeline {
    pool: SqlitePool,
    ledger: RevisionLedger,
    chunker: Chunker,
    ranker: Ranker,
    ranking: RankingConfig,
    index: Arc<dyn VectorIndex>,
}

impl Pipeline {
    pub fn new(pool: SqlitePool, config: Config, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            ledger: RevisionLedger::new(pool.clone()),
            chunker: Chunker::new(config.chunking),
            ranker: Ranker::new(config.ranking.clone()),
            ranking: config.ranking,
            index,
            pool,
        }
    }

    pub fn ledger(&self) -> &RevisionLedger {
        &self.ledger
    }

    /// Ingest raw bytes for a document and make the new revision
    /// searchable.
    ///
    /// Bytes identical to the current revision are a no-op: no new
    /// revision, no chunking, no index writes.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        bytes: &[u8],
        source_url: Option<&str>,
    ) -> anyhow::Result<IngestOutcome> {
        let (revision, created) = self.ledger.ingest(document_id, bytes, source_url).await?;

        if !created {
            return Ok(IngestOutcome {
                revision,
                created: false,
                chunks_written: 0,
                table_chunks: 0,
                degraded_chunks: 0,
                indexed: true,
            });
        }

        let text = String::from_utf8_lossy(bytes);
        let chunks = self.chunker.chunk(&revision.id, &text);
        self.replace_chunks(&revision.id, &chunks).await?;

        let entries: Vec<IndexEntry> = chunks.iter().map(index_entry).collect();
        let indexed = match self.index.upsert(&entries).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    document_id,
                    revision_id = %revision.id,
                    error = %err,
                    "index upsert failed, revision remains committed"
                );
                false
            }
        };

        let outcome = IngestOutcome {
            table_chunks: chunks.iter().filter(|c| c.kind == ChunkKind::Table).count(),
            degraded_chunks: chunks.iter().filter(|c| c.degraded).count(),
            chunks_written: chunks.len(),
            revision,
            created: true,
            indexed,
        };

        info!(
            document_id,
            revision_id = %outcome.revision.id,
            chunks = outcome.chunks_written,
            tables = outcome.table_chunks,
            degraded = outcome.degraded_chunks,
            indexed = outcome.indexed,
            "ingested document"
        );

        Ok(outcome)
    }

    /// Search current revisions only.
    pub async fn search(&self, query: &str) -> anyhow::Result<Vec<ScoredChunk>> {
        let variants = expand_query(query);

        let mut retrieved: Vec<RetrievedChunk> = Vec::new();
        for variant in &variants {
            let hits = self
                .index
                .query(&variant.text, self.ranking.candidate_k)
                .await
                .with_context(|| format!("index query failed for variant {}", variant.label))?;

            for hit in hits {
                if let Some(chunk) = self.load_current_chunk(&hit.chunk_id).await? {
                    retrieved.push(RetrievedChunk {
                        chunk,
                        variant: variant.label,
                        base_score: hit.score,
                    });
                }
            }
        }

        let mut ranked = self.ranker.rank(query, retrieved);
        ranked.truncate(self.ranking.final_limit);
        Ok(ranked)
    }

    /// Sweep old archived revisions and drop their index entries.
    ///
    /// Index removal is best-effort: entries that survive a failed
    /// remove are filtered at query time like any other stale entry.
    pub async fn sweep_archives(
        &self,
        older_than: chrono::Duration,
    ) -> anyhow::Result<SweepOutcome> {
        let outcome = self.ledger.sweep_archives(older_than).await?;

        if !outcome.chunk_ids.is_empty() {
            if let Err(err) = self.index.remove(&outcome.chunk_ids).await {
                warn!(
                    chunks = outcome.chunk_ids.len(),
                    error = %err,
                    "index entry removal failed after sweep"
                );
            }
        }

        Ok(outcome)
    }

    /// Chunks of a revision in ordinal order.
    pub async fn chunks_for_revision(&self, revision_id: &str) -> anyhow::Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, revision_id, ordinal, kind, text, title, category, degraded
            FROM chunks WHERE revision_id = ? ORDER BY ordinal ASC
            "#,
        )
        .bind(revision_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    /// Replace a revision's chunks atomically. Chunking is deterministic,
    /// so a retried ingest writes the same rows.
    async fn replace_chunks(&self, revision_id: &str, chunks: &[Chunk]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE revision_id = ?")
            .bind(revision_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, revision_id, ordinal, kind, text, title, category, degraded)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.revision_id)
            .bind(chunk.ordinal)
            .bind(chunk.kind.as_str())
            .bind(&chunk.text)
            .bind(&chunk.title)
            .bind(&chunk.category)
            .bind(chunk.degraded as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load a chunk only if its revision is still current. Index entries
    /// for archived revisions fall out here.
    async fn load_current_chunk(&self, chunk_id: &str) -> anyhow::Result<Option<Chunk>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.revision_id, c.ordinal, c.kind, c.text, c.title, c.category, c.degraded
            FROM chunks c
            JOIN revisions r ON r.id = c.revision_id
            WHERE c.id = ? AND r.status = 'current'
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chunk_from_row))
    }
}

fn index_entry(chunk: &Chunk) -> IndexEntry {
    IndexEntry {
        chunk_id: chunk.id.clone(),
        text: chunk.text.clone(),
        kind: chunk.kind,
        metadata: serde_json::json!({
            "revision_id": chunk.revision_id,
            "ordinal": chunk.ordinal,
            "title": chunk.title,
            "category": chunk.category,
            "degraded": chunk.degraded,
        }),
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let kind: String = row.get("kind");
    let degraded: i64 = row.get("degraded");
    Chunk {
        id: row.get("id"),
        revision_id: row.get("revision_id"),
        ordinal: row.get("ordinal"),
        // The CHECK constraint limits kind to the two known values.
        kind: ChunkKind::parse(&kind).unwrap_or(ChunkKind::Prose),
        text: row.get("text"),
        title: row.get("title"),
        category: row.get("category"),
        degraded: degraded != 0,
    }
}
