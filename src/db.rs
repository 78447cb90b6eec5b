//! SQLite connection and schema migration.
//!
//! The schema encodes the ledger invariants directly where SQLite can:
//! a partial unique index guarantees at most one current revision per
//! document, and `(revision_id, ordinal)` uniqueness keys the chunk table.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            source_url TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('current', 'archived')),
            FOREIGN KEY (document_id) REFERENCES documents(document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one current revision per document, enforced by the schema.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_revisions_one_current
        ON revisions(document_id) WHERE status = 'current'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            hash TEXT PRIMARY KEY,
            bytes BLOB NOT NULL,
            byte_size INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            revision_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('prose', 'table')),
            text TEXT NOT NULL,
            title TEXT,
            category TEXT,
            degraded INTEGER NOT NULL DEFAULT 0,
            UNIQUE(revision_id, ordinal),
            FOREIGN KEY (revision_id) REFERENCES revisions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_revisions_document_id ON revisions(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_revisions_ingested_at ON revisions(ingested_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_revision_id ON chunks(revision_id)")
        .execute(pool)
        .await?;

    Ok(())
}
