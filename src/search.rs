//! Hybrid retrieval over the interaction log.
//!
//! The engine fuses two retrieval paths over the same corpus:
//!
//! - **Lexical** — FTS5 full-text search (BM25) over prompt+response. This
//!   is the primary path; its failures are hard errors.
//! - **Semantic** — cosine similarity over stored embedding vectors. This
//!   path is optional: when no embedding provider is configured (or the
//!   provider fails to construct) the engine is built as the lexical-only
//!   variant, and runtime failures of the semantic leg degrade to an empty
//!   candidate set with a warning.
//!
//! # Fusion Algorithm
//!
//! 1. Fetch `candidate_k` candidates from each available path.
//! 2. Min-max normalize each candidate set to `[0, 1]`.
//! 3. Merge by entry id: `score = (1 - α) × lexical + α × semantic`, with an
//!    absent leg scored 0. Entries present in both sets are tagged `hybrid`.
//! 4. Sort by score (desc), timestamp (desc), id (asc).
//! 5. Truncate to `limit`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{InteractionEntry, RetrievalResult, RetrievalSource};
use crate::store::{EntryCandidate, InteractionStore};

struct SemanticBackend {
    provider: Box<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

/// The retrieval surface consumed by the assembler and the tool dispatcher.
///
/// [`RetrievalEngine`] is the production implementation; tests substitute
/// recording stubs.
#[async_trait::async_trait]
pub trait SessionSearch: Send + Sync {
    /// Hybrid search, best first, truncated to `limit`.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<RetrievalResult>>;

    /// The newest `n` entries, newest first.
    async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>>;
}

/// Hybrid retrieval engine over an [`InteractionStore`].
///
/// Whether the semantic leg exists is decided once, at construction; callers
/// never observe a missing backend as an error.
pub struct RetrievalEngine {
    store: Arc<dyn InteractionStore>,
    params: RetrievalConfig,
    semantic: Option<SemanticBackend>,
}

impl RetrievalEngine {
    /// Build an engine, detecting semantic capability from the embedding
    /// configuration. A disabled or unconstructible provider yields the
    /// lexical-only variant.
    pub fn new(
        store: Arc<dyn InteractionStore>,
        params: RetrievalConfig,
        embedding_config: EmbeddingConfig,
    ) -> Self {
        let semantic = if embedding_config.is_enabled() {
            match embedding::create_provider(&embedding_config) {
                Ok(provider) => Some(SemanticBackend {
                    provider,
                    config: embedding_config,
                }),
                Err(e) => {
                    tracing::warn!("semantic retrieval unavailable: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            store,
            params,
            semantic,
        }
    }

    /// Whether this engine carries a semantic leg.
    pub fn is_hybrid(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn store(&self) -> &Arc<dyn InteractionStore> {
        &self.store
    }

    /// The newest `n` entries, newest first.
    pub async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>> {
        self.store.recent(n).await
    }

    /// Lexical-only search, normalized scores, best first.
    pub async fn search_lexical(&self, query: &str, limit: i64) -> Result<Vec<RetrievalResult>> {
        let candidates = self.store.keyword_search(query, self.params.candidate_k).await?;
        Ok(fuse(candidates, Vec::new(), 0.0, limit))
    }

    /// Semantic-only search. Empty when the engine is lexical-only or the
    /// semantic leg fails at runtime.
    pub async fn search_semantic(&self, query: &str, limit: i64) -> Result<Vec<RetrievalResult>> {
        let candidates = self.semantic_candidates(query).await;
        Ok(fuse(Vec::new(), candidates, 1.0, limit))
    }

    /// Hybrid search: union of both paths, deduplicated and fused.
    ///
    /// Lexical failures propagate; semantic failures degrade silently.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lexical = self.store.keyword_search(query, self.params.candidate_k).await?;
        let semantic = self.semantic_candidates(query).await;

        Ok(fuse(lexical, semantic, self.params.hybrid_alpha, limit))
    }

    async fn semantic_candidates(&self, query: &str) -> Vec<EntryCandidate> {
        let Some(backend) = &self.semantic else {
            return Vec::new();
        };

        let query_vec =
            match embedding::embed_query(backend.provider.as_ref(), &backend.config, query).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("semantic leg degraded to empty: {:#}", e);
                    return Vec::new();
                }
            };

        match self
            .store
            .vector_search(&query_vec, self.params.candidate_k)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("semantic leg degraded to empty: {:#}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl SessionSearch for RetrievalEngine {
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<RetrievalResult>> {
        RetrievalEngine::search(self, query, limit).await
    }

    async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>> {
        RetrievalEngine::recent(self, n).await
    }
}

/// Min-max normalize raw candidate scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they normalize to `1.0`.
fn normalize(candidates: &[EntryCandidate]) -> Vec<(i64, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c.entry.id, norm)
        })
        .collect()
}

/// Fuse lexical and semantic candidate sets into one ranked, deduplicated
/// result list.
///
/// Pure function so the merge semantics are testable without a store.
pub fn fuse(
    lexical: Vec<EntryCandidate>,
    semantic: Vec<EntryCandidate>,
    alpha: f64,
    limit: i64,
) -> Vec<RetrievalResult> {
    if lexical.is_empty() && semantic.is_empty() {
        return Vec::new();
    }

    let lex_scores: HashMap<i64, f64> = normalize(&lexical).into_iter().collect();
    let sem_scores: HashMap<i64, f64> = normalize(&semantic).into_iter().collect();

    // Union of entries, keyed by id. Either set may carry the entry body.
    let mut entries: HashMap<i64, InteractionEntry> = HashMap::new();
    for c in lexical.iter().chain(semantic.iter()) {
        entries.entry(c.entry.id).or_insert_with(|| c.entry.clone());
    }

    let mut results: Vec<RetrievalResult> = entries
        .into_values()
        .map(|entry| {
            let lex = lex_scores.get(&entry.id).copied();
            let sem = sem_scores.get(&entry.id).copied();
            let source = match (lex, sem) {
                (Some(_), Some(_)) => RetrievalSource::Hybrid,
                (Some(_), None) => RetrievalSource::Lexical,
                _ => RetrievalSource::Semantic,
            };
            let score = (1.0 - alpha) * lex.unwrap_or(0.0) + alpha * sem.unwrap_or(0.0);
            RetrievalResult {
                entry,
                score,
                source,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.entry.timestamp.cmp(&a.entry.timestamp))
            .then(a.entry.id.cmp(&b.entry.id))
    });
    results.truncate(limit.max(0) as usize);

    results
}

/// Merge the unconditionally-included most-recent entries with ranked hits
/// into the chronological session context: dedupe by id, sort ascending by
/// timestamp (then id) for logical conversation flow.
pub fn merge_session_context(
    recent: Vec<InteractionEntry>,
    hits: Vec<RetrievalResult>,
) -> Vec<InteractionEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<InteractionEntry> = Vec::new();

    for entry in recent.into_iter().chain(hits.into_iter().map(|r| r.entry)) {
        if seen.insert(entry.id) {
            merged.push(entry);
        }
    }

    merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    merged
}
