//! SQLite-backed [`InteractionStore`] implementation.
//!
//! Maps each store operation onto the schema created by [`crate::migrate`]:
//! `interactions`, the `interactions_fts` FTS5 index, and
//! `interaction_vectors`. Appends write the base row and its FTS row in one
//! transaction so the lexical index can never lag the log.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{cosine_similarity, decode_embedding, encode_embedding};
use crate::models::InteractionEntry;
use crate::store::{EntryCandidate, InteractionStore};

/// SQLite implementation of the [`InteractionStore`] trait.
pub struct SqliteInteractionStore {
    pool: SqlitePool,
}

impl SqliteInteractionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Escape a free-form query for FTS5 prefix matching.
///
/// Each whitespace token is double-quoted (so punctuation like `.` or `-`
/// cannot break the MATCH grammar) and suffixed with `*`; tokens are joined
/// with AND so all must match.
pub fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> InteractionEntry {
    InteractionEntry {
        id: row.get("id"),
        prompt: row.get("prompt"),
        response: row.get("response"),
        timestamp: row.get("created_at"),
        cwd: row.get("cwd"),
    }
}

#[async_trait]
impl InteractionStore for SqliteInteractionStore {
    async fn append(
        &self,
        prompt: &str,
        response: &str,
        cwd: &str,
        timestamp: i64,
    ) -> Result<InteractionEntry> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO interactions (prompt, response, created_at, cwd)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(prompt)
        .bind(response)
        .bind(timestamp)
        .bind(cwd)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO interactions_fts (entry_id, prompt, response) VALUES (?, ?, ?)")
            .bind(id)
            .bind(prompt)
            .bind(response)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(InteractionEntry {
            id,
            prompt: prompt.to_string(),
            response: response.to_string(),
            timestamp,
            cwd: cwd.to_string(),
        })
    }

    async fn recent(&self, n: i64) -> Result<Vec<InteractionEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, prompt, response, created_at, cwd
            FROM interactions
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_entry).collect())
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<EntryCandidate>> {
        let escaped = escape_fts_query(query);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT i.id, i.prompt, i.response, i.created_at, i.cwd,
                   interactions_fts.rank AS rank
            FROM interactions_fts
            JOIN interactions i ON i.id = interactions_fts.entry_id
            WHERE interactions_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&escaped)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // BM25 rank is "smaller is better"; negate so higher means better.
        let candidates = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                EntryCandidate {
                    entry: row_to_entry(row),
                    raw_score: -rank,
                }
            })
            .collect();

        Ok(candidates)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: i64) -> Result<Vec<EntryCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.prompt, i.response, i.created_at, i.cwd, v.embedding
            FROM interaction_vectors v
            JOIN interactions i ON i.id = v.entry_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<EntryCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = decode_embedding(&blob);
                EntryCandidate {
                    entry: row_to_entry(row),
                    raw_score: cosine_similarity(query_vec, &vec) as f64,
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

    async fn upsert_embedding(&self, entry_id: i64, vector: &[f32], model: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let blob = encode_embedding(vector);

        sqlx::query(
            r#"
            INSERT INTO interaction_vectors (entry_id, embedding, model, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entry_id) DO UPDATE SET
                embedding = excluded.embedding,
                model = excluded.model,
                created_at = excluded.created_at
            "#,
        )
        .bind(entry_id)
        .bind(&blob)
        .bind(model)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn missing_embeddings(&self, limit: i64) -> Result<Vec<InteractionEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.prompt, i.response, i.created_at, i.cwd
            FROM interactions i
            LEFT JOIN interaction_vectors v ON v.entry_id = i.id
            WHERE v.entry_id IS NULL
            ORDER BY i.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_entry).collect())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
