//! Per-document revision history.
//!
//! The ledger owns the only shared mutable state in the pipeline: the
//! current-revision pointer of each document. Ingests for the same
//! document are serialized by a per-document async mutex; ingests for
//! different documents proceed fully in parallel. Promotion archives the
//! prior current revision and inserts the new one inside a single
//! transaction, so the current pointer moves atomically and exactly one
//! ingest wins any race for a given prior value.
//!
//! Content is committed to the [`ContentStore`] before the ledger
//! transaction, so a crash in between can orphan bytes but never leave a
//! revision pointing at missing content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{DocumentRecord, Revision, RevisionStatus, SweepOutcome};
use crate::store::{content_hash, ContentStore};

pub struct RevisionLedger {
    pool: SqlitePool,
    store: ContentStore,
    doc_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RevisionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        let store = ContentStore::new(pool.clone());
        Self {
            pool,
            store,
            doc_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    fn lock_for(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.doc_locks.lock().expect("doc lock map poisoned");
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingest raw bytes for a document.
    ///
    /// Returns the current revision and whether a new one was created.
    /// Re-ingesting bytes identical to the current revision is a no-op
    /// returning `(existing, false)`.
    pub async fn ingest(
        &self,
        document_id: &str,
        bytes: &[u8],
        source_url: Option<&str>,
    ) -> Result<(Revision, bool)> {
        let hash = content_hash(bytes);

        let doc_lock = self.lock_for(document_id);
        let _guard = doc_lock.lock().await;

        self.ensure_document(document_id, source_url).await?;

        if let Some(current) = self.current_revision(document_id).await? {
            if current.content_hash == hash {
                debug!(
                    document_id,
                    hash = %hash,
                    "bytes identical to current revision, skipping"
                );
                return Ok((current, false));
            }
        }

        // Content commit happens-before the ledger commit.
        self.store.put(bytes).await?;

        let revision = Revision {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            content_hash: hash,
            byte_size: bytes.len() as i64,
            ingested_at: Utc::now(),
            status: RevisionStatus::Current,
        };

        let mut tx = self.pool.begin().await?;

        let archived = sqlx::query(
            "UPDATE revisions SET status = 'archived' WHERE document_id = ? AND status = 'current'",
        )
        .bind(document_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO revisions (id, document_id, content_hash, byte_size, ingested_at, status)
            VALUES (?, ?, ?, ?, ?, 'current')
            "#,
        )
        .bind(&revision.id)
        .bind(&revision.document_id)
        .bind(&revision.content_hash)
        .bind(revision.byte_size)
        .bind(revision.ingested_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            document_id,
            revision_id = %revision.id,
            hash = %revision.content_hash,
            archived_prior = archived > 0,
            "promoted new current revision"
        );

        Ok((revision, true))
    }

    /// The current revision of a document, if any.
    pub async fn current_revision(&self, document_id: &str) -> Result<Option<Revision>> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, content_hash, byte_size, ingested_at, status
            FROM revisions WHERE document_id = ? AND status = 'current'
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| revision_from_row(&r)))
    }

    /// A revision by ID.
    pub async fn get_revision(&self, revision_id: &str) -> Result<Revision> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, content_hash, byte_size, ingested_at, status
            FROM revisions WHERE id = ?
            "#,
        )
        .bind(revision_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| revision_from_row(&r))
            .ok_or_else(|| CoreError::not_found("revision", revision_id))
    }

    /// Full revision history of a document, newest first.
    pub async fn history(&self, document_id: &str) -> Result<Vec<Revision>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content_hash, byte_size, ingested_at, status
            FROM revisions WHERE document_id = ?
            ORDER BY ingested_at DESC, id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(revision_from_row).collect())
    }

    /// Every document's current revision.
    pub async fn inventory(&self) -> Result<Vec<Revision>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content_hash, byte_size, ingested_at, status
            FROM revisions WHERE status = 'current'
            ORDER BY document_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(revision_from_row).collect())
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT document_id, source_url, created_at FROM documents WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DocumentRecord {
            document_id: r.get("document_id"),
            source_url: r.get("source_url"),
            created_at: millis_to_datetime(r.get("created_at")),
        }))
    }

    /// Delete archived revisions older than the given age, along with
    /// their chunks and any content no surviving revision references.
    ///
    /// Retention is external policy; the ledger only sweeps when asked.
    /// Returns the swept revisions' count and their chunk IDs, so the
    /// caller can drop the matching index entries.
    pub async fn sweep_archives(&self, older_than: Duration) -> Result<SweepOutcome> {
        let cutoff = (Utc::now() - older_than).timestamp_millis();

        let doomed = sqlx::query(
            "SELECT id, content_hash FROM revisions WHERE status = 'archived' AND ingested_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        if doomed.is_empty() {
            return Ok(SweepOutcome {
                revisions_removed: 0,
                chunk_ids: Vec::new(),
            });
        }

        let mut tx = self.pool.begin().await?;
        let mut chunk_ids: Vec<String> = Vec::new();

        for row in &doomed {
            let id: String = row.get("id");
            let chunk_rows = sqlx::query("SELECT id FROM chunks WHERE revision_id = ?")
                .bind(&id)
                .fetch_all(&mut *tx)
                .await?;
            chunk_ids.extend(chunk_rows.iter().map(|r| r.get::<String, _>("id")));
            sqlx::query("DELETE FROM chunks WHERE revision_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM revisions WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }

        for row in &doomed {
            let hash: String = row.get("content_hash");
            sqlx::query(
                r#"
                DELETE FROM contents WHERE hash = ?
                AND NOT EXISTS (SELECT 1 FROM revisions WHERE content_hash = ?)
                "#,
            )
            .bind(&hash)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            removed = doomed.len(),
            chunks = chunk_ids.len(),
            "swept archived revisions"
        );
        Ok(SweepOutcome {
            revisions_removed: doomed.len() as u64,
            chunk_ids,
        })
    }

    async fn ensure_document(&self, document_id: &str, source_url: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO documents (document_id, source_url, created_at) VALUES (?, ?, ?)",
        )
        .bind(document_id)
        .bind(source_url)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn revision_from_row(row: &sqlx::sqlite::SqliteRow) -> Revision {
    let status: String = row.get("status");
    Revision {
        id: row.get("id"),
        document_id: row.get("document_id"),
        content_hash: row.get("content_hash"),
        byte_size: row.get("byte_size"),
        ingested_at: millis_to_datetime(row.get("ingested_at")),
        // The CHECK constraint limits status to the two known values.
        status: RevisionStatus::parse(&status).unwrap_or(RevisionStatus::Archived),
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
