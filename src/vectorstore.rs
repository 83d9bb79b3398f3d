//! Persisted vector index, one collection per knowledge base.
//!
//! Each knowledge base's vector directory holds a single SQLite database
//! (`vectors.sqlite`) with the embedded chunks of one collection. The
//! collection identifier is derived deterministically from the vector
//! directory path, so the write path and the read path always resolve to
//! the same collection across process restarts. Similarity search scans the
//! collection and ranks by cosine similarity computed in Rust.

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingClient};
use crate::error::{Error, Result};

/// Database file inside a knowledge base's vector directory.
const INDEX_FILE: &str = "vectors.sqlite";

/// Collection identifiers are 3..=512 chars, alphanumeric at both ends,
/// alphanumeric or underscore in between.
const MAX_COLLECTION_ID: usize = 512;

/// A chunk ready for indexing: text plus its source-path metadata.
#[derive(Debug, Clone)]
pub struct DocChunk {
    pub text: String,
    pub source: String,
}

/// A retrieved chunk with its similarity score, best first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Derive the engine-legal collection identifier for a vector directory.
///
/// The final path component is sanitized (non-alphanumeric characters
/// become `_`, then the ends are trimmed). Names that sanitize to fewer
/// than three characters, or that contain anything outside printable
/// ASCII, are replaced by a hash of the full path instead of failing.
/// Idempotent: the same path maps to the same identifier on every call.
pub fn derive_collection_id(vector_dir: &Path) -> String {
    let name = vector_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name.is_ascii() {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let trimmed = sanitized.trim_matches('_');
        if trimmed.len() >= 3 {
            let mut id = trimmed.to_string();
            if id.len() > MAX_COLLECTION_ID {
                id.truncate(MAX_COLLECTION_ID);
                id = id.trim_end_matches('_').to_string();
            }
            return id;
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(vector_dir.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("kb{}", &digest[..32])
}

pub struct VectorIndex {
    embedder: EmbeddingClient,
}

impl VectorIndex {
    pub fn new(config: &Config) -> Self {
        Self {
            embedder: EmbeddingClient::new(&config.ollama),
        }
    }

    /// Embed `chunks` and append them to the collection at `vector_dir`,
    /// then flush to durable storage. A no-op for empty input: no embedding
    /// calls, no writes.
    pub async fn add(&self, vector_dir: &Path, chunks: &[DocChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let pool = open_index(vector_dir, true).await?;
        let outcome = self.add_inner(&pool, vector_dir, chunks).await;
        pool.close().await;
        outcome
    }

    async fn add_inner(
        &self,
        pool: &SqlitePool,
        vector_dir: &Path,
        chunks: &[DocChunk],
    ) -> Result<()> {
        ensure_schema(pool).await?;
        let collection = derive_collection_id(vector_dir);
        stamp_model(pool, &collection, self.embedder.model()).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let mut tx = pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO embeddings (id, collection_id, source, text, vector) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&collection)
            .bind(&chunk.source)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            collection = %collection,
            chunks = chunks.len(),
            "indexed chunks"
        );
        Ok(())
    }

    /// Return the `top_k` chunks nearest to `query`, best first. A missing
    /// or empty collection yields an empty result, not an error.
    pub async fn search(
        &self,
        vector_dir: &Path,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if !vector_dir.join(INDEX_FILE).exists() {
            return Ok(Vec::new());
        }

        let pool = open_index(vector_dir, false).await?;
        let outcome = self.search_inner(&pool, vector_dir, query, top_k).await;
        pool.close().await;
        outcome
    }

    async fn search_inner(
        &self,
        pool: &SqlitePool,
        vector_dir: &Path,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        ensure_schema(pool).await?;
        let collection = derive_collection_id(vector_dir);
        check_model_stamp(pool, &collection, self.embedder.model()).await?;

        let rows = sqlx::query("SELECT source, text, vector FROM embeddings WHERE collection_id = ?")
            .bind(&collection)
            .fetch_all(pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingFailed("empty embedding response".to_string()))?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                ScoredChunk {
                    text: row.get("text"),
                    source: row.get("source"),
                    score: cosine_similarity(&query_vec, &vector),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

async fn open_index(vector_dir: &Path, create: bool) -> Result<SqlitePool> {
    let db_path = vector_dir.join(INDEX_FILE);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(Error::Index)?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id TEXT PRIMARY KEY,
            collection_id TEXT NOT NULL,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            FOREIGN KEY (collection_id) REFERENCES collections(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_collection ON embeddings(collection_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the embedding model used at first write. Later writes with a
/// different configured model keep the original stamp and log a warning:
/// mixed-model collections degrade similarity quality silently otherwise.
async fn stamp_model(pool: &SqlitePool, collection: &str, model: &str) -> Result<()> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT model FROM collections WHERE id = ?")
            .bind(collection)
            .fetch_optional(pool)
            .await?;

    match existing {
        None => {
            sqlx::query("INSERT INTO collections (id, model, created_at) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(model)
                .bind(chrono::Utc::now().timestamp())
                .execute(pool)
                .await?;
        }
        Some(stamped) if stamped != model => {
            tracing::warn!(
                collection = %collection,
                stamped = %stamped,
                configured = %model,
                "embedding model differs from the one this collection was built with"
            );
        }
        Some(_) => {}
    }
    Ok(())
}

async fn check_model_stamp(pool: &SqlitePool, collection: &str, model: &str) -> Result<()> {
    let stamped: Option<String> = sqlx::query_scalar("SELECT model FROM collections WHERE id = ?")
        .bind(collection)
        .fetch_optional(pool)
        .await?;

    if let Some(stamped) = stamped {
        if stamped != model {
            tracing::warn!(
                collection = %collection,
                stamped = %stamped,
                configured = %model,
                "querying with a different embedding model than the collection was built with"
            );
        }
    }
    Ok(())
}
