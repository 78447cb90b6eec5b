//! Core data models used throughout doc-ledger.
//!
//! These types represent the documents, revisions, chunks, and scored
//! results that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A logical named source whose content changes over time.
///
/// Documents are never deleted, only superseded by newer revisions.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a [`Revision`].
///
/// At most one revision per document is `Current`; the transition
/// `Current -> Archived` happens exactly once, on promotion of a newer
/// revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RevisionStatus {
    Current,
    Archived,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Current => "current",
            RevisionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current" => Some(RevisionStatus::Current),
            "archived" => Some(RevisionStatus::Archived),
            _ => None,
        }
    }
}

/// One immutable content snapshot of a document, identified by content hash.
#[derive(Debug, Clone)]
pub struct Revision {
    /// Revision UUID.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// SHA-256 hex digest of the raw bytes.
    pub content_hash: String,
    /// Size of the raw bytes.
    pub byte_size: i64,
    pub ingested_at: DateTime<Utc>,
    pub status: RevisionStatus,
}

/// Chunk classification produced by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkKind {
    Prose,
    Table,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Prose => "prose",
            ChunkKind::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prose" => Some(ChunkKind::Prose),
            "table" => Some(ChunkKind::Table),
            _ => None,
        }
    }

    /// Sort rank used for tie-breaking: tables before prose.
    pub fn rank(&self) -> u8 {
        match self {
            ChunkKind::Table => 0,
            ChunkKind::Prose => 1,
        }
    }
}

/// One retrieval-unit span of text with a kind and metadata.
///
/// Chunks are created once per revision, are immutable, and are keyed by
/// `(revision_id, ordinal)`. The chunk ID is derived from that key so that
/// re-chunking the same revision yields identical chunks.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub revision_id: String,
    /// Position within the document, contiguous from 0.
    pub ordinal: i64,
    pub kind: ChunkKind,
    pub text: String,
    /// Nearest preceding heading, for table chunks.
    pub title: Option<String>,
    /// Detected category label, for table chunks.
    pub category: Option<String>,
    /// Set when the chunk was produced from a truncated or malformed region.
    pub degraded: bool,
}

impl Chunk {
    /// Deterministic chunk ID for a `(revision, ordinal)` pair.
    pub fn make_id(revision_id: &str, ordinal: i64) -> String {
        format!("{}:{}", revision_id, ordinal)
    }
}

/// One expanded rewrite of an input query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    /// Stable variant label, e.g. `"original"` or `"feature-table"`.
    pub label: &'static str,
    pub text: String,
}

/// A chunk retrieved from the external index under one query variant.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Label of the variant this chunk was retrieved under.
    pub variant: &'static str,
    /// Similarity score supplied by the external index.
    pub base_score: f64,
}

/// A ranked chunk with its score breakdown, for explainable ranking.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Best similarity score across the variants this chunk was retrieved under.
    pub base_score: f64,
    /// Additive structural boost, always within the configured bounds.
    pub boost: f64,
    /// Label of the variant that produced `base_score`.
    pub winning_variant: &'static str,
    pub final_score: f64,
}

/// Payload emitted to the external embedding/index per chunk.
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub text: String,
    pub kind: ChunkKind,
    pub metadata: serde_json::Value,
}

/// Outcome of one `ingest_document` call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub revision: Revision,
    /// False when the bytes were identical to the current revision.
    pub created: bool,
    pub chunks_written: usize,
    pub table_chunks: usize,
    pub degraded_chunks: usize,
    /// False when the external index rejected the entries (non-fatal).
    pub indexed: bool,
}

/// Outcome of one `sweep_archives` call.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub revisions_removed: u64,
    /// IDs of the chunks deleted along with the swept revisions, for
    /// index cleanup.
    pub chunk_ids: Vec<String>,
}
