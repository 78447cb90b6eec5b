//! Error taxonomy for the ingestion and retrieval core.
//!
//! The ledger and content store report failures through [`CoreError`] so
//! callers can distinguish integrity violations (fatal, never silently
//! resolved) from transient storage failures (retried by the fetcher, not
//! by this crate) and plain lookup misses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A content hash already maps to bytes of a different length.
    /// Fails closed: the ingest aborts rather than overwriting.
    #[error("content hash collision for {hash}: stored {existing} bytes, incoming {incoming} bytes")]
    Integrity {
        hash: String,
        existing: i64,
        incoming: i64,
    },

    /// A requested hash, revision, or chunk is absent.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Underlying database failure. Transient; the caller decides retry policy.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            key: key.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
