//! Core data models used throughout shell-sage.
//!
//! These types represent the interactions, retrieval results, and terminal
//! history entries that flow through the context assembly pipeline.

use serde::{Deserialize, Serialize};

/// A completed prompt/response turn stored in the interaction log.
///
/// Entries are immutable and append-only; `id` is assigned by the store
/// (SQLite AUTOINCREMENT) and is strictly increasing, which makes it the
/// dedup key whenever result sets from different retrieval paths are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub id: i64,
    pub prompt: String,
    pub response: String,
    /// Unix timestamp (seconds) of when the turn completed.
    pub timestamp: i64,
    /// Working directory the query was asked from.
    pub cwd: String,
}

/// Which retrieval path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Lexical,
    Semantic,
    /// Present in both the lexical and semantic candidate sets.
    Hybrid,
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalSource::Lexical => write!(f, "lexical"),
            RetrievalSource::Semantic => write!(f, "semantic"),
            RetrievalSource::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A scored entry returned from the retrieval engine.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub entry: InteractionEntry,
    /// Fused relevance score in `[0.0, 1.0]`.
    pub score: f64,
    pub source: RetrievalSource,
}

/// One parsed line of terminal history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Unix timestamp (seconds); 0 when the history format carries none.
    pub timestamp: i64,
    /// Command duration in seconds; 0 when unknown.
    pub duration: i64,
    pub command: String,
}
