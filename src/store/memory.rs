//! In-memory [`InteractionStore`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock` for thread safety. Keyword search
//! is a naive token-frequency scan; vector search is brute-force cosine
//! similarity over all stored vectors.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::InteractionEntry;

use super::{EntryCandidate, InteractionStore};

struct StoredVector {
    entry_id: i64,
    vector: Vec<f32>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<InteractionEntry>>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-built entries (ids are taken as-is).
    pub fn with_entries(entries: Vec<InteractionEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            vectors: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InteractionStore for InMemoryStore {
    async fn append(
        &self,
        prompt: &str,
        response: &str,
        cwd: &str,
        timestamp: i64,
    ) -> Result<InteractionEntry> {
        let mut entries = self.entries.write().unwrap();
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let entry = InteractionEntry {
            id,
            prompt: prompt.to_string(),
            response: response.to_string(),
            timestamp,
            cwd: cwd.to_string(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>> {
        let entries = self.entries.read().unwrap();
        let mut sorted: Vec<InteractionEntry> = entries.clone();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        sorted.truncate(n.max(0) as usize);
        Ok(sorted)
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<EntryCandidate>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().unwrap();
        let mut candidates: Vec<EntryCandidate> = entries
            .iter()
            .filter_map(|e| {
                let haystack = format!("{} {}", e.prompt, e.response).to_lowercase();
                let hits: usize = terms
                    .iter()
                    .map(|t| haystack.matches(t.as_str()).count())
                    .sum();
                if hits == 0 {
                    None
                } else {
                    Some(EntryCandidate {
                        entry: e.clone(),
                        raw_score: hits as f64,
                    })
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<EntryCandidate>> {
        let entries = self.entries.read().unwrap();
        let vectors = self.vectors.read().unwrap();

        let mut candidates: Vec<EntryCandidate> = vectors
            .iter()
            .filter_map(|sv| {
                let entry = entries.iter().find(|e| e.id == sv.entry_id)?;
                Some(EntryCandidate {
                    entry: entry.clone(),
                    raw_score: cosine_similarity(query_vec, &sv.vector) as f64,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn upsert_embedding(&self, entry_id: i64, vector: &[f32], _model: &str) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        vectors.retain(|sv| sv.entry_id != entry_id);
        vectors.push(StoredVector {
            entry_id,
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn missing_embeddings(&self, limit: i64) -> Result<Vec<InteractionEntry>> {
        let entries = self.entries.read().unwrap();
        let vectors = self.vectors.read().unwrap();
        let mut missing: Vec<InteractionEntry> = entries
            .iter()
            .filter(|e| !vectors.iter().any(|sv| sv.entry_id == e.id))
            .cloned()
            .collect();
        missing.sort_by_key(|e| e.id);
        missing.truncate(limit.max(0) as usize);
        Ok(missing)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.entries.read().unwrap().len() as i64)
    }
}
