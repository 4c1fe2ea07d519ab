//! Storage abstraction for the interaction log.
//!
//! The [`InteractionStore`] trait defines all storage operations needed by
//! the retrieval engine and the query loop, enabling pluggable backends
//! (SQLite for the CLI, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::InteractionEntry;

/// A candidate entry returned from keyword or vector search.
///
/// Carries the raw backend score (BM25 rank or cosine similarity) so the
/// retrieval engine can normalize and fuse the candidate sets without
/// additional round-trips.
#[derive(Debug, Clone)]
pub struct EntryCandidate {
    pub entry: InteractionEntry,
    pub raw_score: f64,
}

/// Abstract storage backend for the append-only interaction log.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append`](InteractionStore::append) | Record a completed prompt/response turn |
/// | [`recent`](InteractionStore::recent) | Fetch the newest N entries, newest first |
/// | [`keyword_search`](InteractionStore::keyword_search) | Full-text search over prompt+response |
/// | [`vector_search`](InteractionStore::vector_search) | Cosine similarity over stored embeddings |
/// | [`upsert_embedding`](InteractionStore::upsert_embedding) | Store an embedding vector for an entry |
/// | [`missing_embeddings`](InteractionStore::missing_embeddings) | Entries without a vector (backfill) |
/// | [`count`](InteractionStore::count) | Total entries stored |
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Append a completed turn. Returns the stored entry with its assigned,
    /// strictly increasing id.
    async fn append(
        &self,
        prompt: &str,
        response: &str,
        cwd: &str,
        timestamp: i64,
    ) -> Result<InteractionEntry>;

    /// The newest `n` entries, newest first.
    async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>>;

    /// Full-text search over prompts and responses, best match first.
    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<EntryCandidate>>;

    /// Cosine-similarity search over stored embedding vectors, best first.
    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<EntryCandidate>>;

    /// Store or replace the embedding vector for an entry.
    async fn upsert_embedding(&self, entry_id: i64, vector: &[f32], model: &str) -> Result<()>;

    /// Entries that have no stored embedding yet, oldest first.
    async fn missing_embeddings(&self, limit: i64) -> Result<Vec<InteractionEntry>>;

    /// Total number of stored entries.
    async fn count(&self) -> Result<i64>;
}
