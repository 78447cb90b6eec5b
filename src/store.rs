//! Content-addressed byte storage.
//!
//! Bytes are keyed by their SHA-256 digest. `put` is idempotent: storing
//! identical bytes twice is a no-op returning the same hash. A hash that
//! already maps to bytes of a different length is an integrity violation
//! and fails closed.
//!
//! The store knows nothing about documents or revisions; the ledger
//! commits content here before it commits any revision pointing at it.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{CoreError, Result};

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store bytes keyed by their content hash. Returns the hash.
    pub async fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = content_hash(bytes);
        let incoming = bytes.len() as i64;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT byte_size FROM contents WHERE hash = ?")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(existing) = existing {
            if existing != incoming {
                return Err(CoreError::Integrity {
                    hash,
                    existing,
                    incoming,
                });
            }
            debug!(hash = %hash, "content already stored");
            return Ok(hash);
        }

        sqlx::query("INSERT OR IGNORE INTO contents (hash, bytes, byte_size) VALUES (?, ?, ?)")
            .bind(&hash)
            .bind(bytes)
            .bind(incoming)
            .execute(&self.pool)
            .await?;

        debug!(hash = %hash, bytes = incoming, "content stored");
        Ok(hash)
    }

    /// Retrieve bytes by content hash.
    pub async fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar("SELECT bytes FROM contents WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;

        bytes.ok_or_else(|| CoreError::not_found("content", hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"hello");
        let b = content_hash(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs_on_content() {
        assert_ne!(content_hash(b"alpha"), content_hash(b"beta"));
    }

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect(&dir.path().join("store.sqlite"))
            .await
            .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, pool) = test_pool().await;
        let store = ContentStore::new(pool);

        let hash = store.put(b"raw document bytes").await.unwrap();
        let bytes = store.get(&hash).await.unwrap();
        assert_eq!(bytes, b"raw document bytes");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (_dir, pool) = test_pool().await;
        let store = ContentStore::new(pool);

        let first = store.put(b"same bytes").await.unwrap();
        let second = store.put(b"same bytes").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, pool) = test_pool().await;
        let store = ContentStore::new(pool);

        let err = store.get("deadbeef").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_length_mismatch_is_integrity_error() {
        let (_dir, pool) = test_pool().await;
        let store = ContentStore::new(pool.clone());

        let hash = store.put(b"original").await.unwrap();

        // Forge a row with the same hash but a wrong recorded length.
        sqlx::query("UPDATE contents SET byte_size = 999 WHERE hash = ?")
            .bind(&hash)
            .execute(&pool)
            .await
            .unwrap();

        let err = store.put(b"original").await.unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
    }
}
