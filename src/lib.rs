//! # Doc Ledger
//!
//! A revision-tracking ingestion and retrieval core for frequently
//! re-published documents.
//!
//! Doc Ledger records every content change of a named document as an
//! immutable revision, chunks revision text with table regions kept
//! intact, and ranks retrieval candidates with deterministic,
//! explainable scoring. Fetching, scheduling, and embedding computation
//! live outside this crate; it starts at raw bytes and ends at ranked
//! chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │  Bytes   │──▶│  Ledger    │──▶│ Chunker  │──▶│  SQLite    │
//! │ (caller) │   │ CAS+Locks │   │ Tables   │   │ WAL       │
//! └──────────┘   └───────────┘   └──────────┘   └────┬──────┘
//!                                                    │
//!                               ┌────────────────────┤
//!                               ▼                    ▼
//!                         ┌──────────┐        ┌──────────┐
//!                         │  Index   │───────▶│  Ranker  │
//!                         │ (trait)  │ search │ Boosts   │
//!                         └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection and schema |
//! | [`store`] | Content-addressed byte storage |
//! | [`ledger`] | Revision history and promotion |
//! | [`chunker`] | Structure-aware chunking |
//! | [`index`] | Similarity index boundary |
//! | [`ranker`] | Query expansion and ranking |
//! | [`pipeline`] | End-to-end ingest and search |

pub mod chunker;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod ranker;
pub mod store;
