//! SQLite-backed [`VectorIndex`].
//!
//! The index is a directory holding `index.sqlite`. Chunks live in
//! `chunks`, their embeddings as little-endian `f32` BLOBs in
//! `chunk_vectors`, and the embedding model that produced them in
//! `index_meta`. Search loads every vector and ranks by cosine similarity.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{check_lengths, rank, VectorIndex};
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::PipelineError;
use crate::migrate;
use crate::models::{ChunkMetadata, RetrievedChunk, RuleChunk};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";

pub struct SqliteIndex {
    dir: PathBuf,
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Whether a persisted index exists at `dir`.
    pub fn exists(dir: &Path) -> bool {
        db::db_path(dir).is_file()
    }

    /// Create a fresh, empty index at `dir`, deleting the previous index
    /// there. A non-empty directory without an index database is left
    /// alone and reported as [`PipelineError::NotAnIndex`].
    pub async fn create(dir: &Path) -> Result<Self> {
        if dir.exists() {
            let empty = dir.is_dir()
                && std::fs::read_dir(dir)
                    .with_context(|| format!("Failed to read index directory {}", dir.display()))?
                    .next()
                    .is_none();
            if !Self::exists(dir) && !empty {
                return Err(PipelineError::NotAnIndex {
                    path: dir.to_path_buf(),
                }
                .into());
            }
            debug!(dir = %dir.display(), "removing existing index directory");
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove index directory {}", dir.display()))?;
        }
        let pool = db::connect(dir, true).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            pool,
        })
    }

    /// Open an existing index; fails with [`PipelineError::IndexMissing`]
    /// when there is none.
    pub async fn open(dir: &Path) -> Result<Self> {
        if !Self::exists(dir) {
            return Err(PipelineError::IndexMissing {
                path: dir.to_path_buf(),
            }
            .into());
        }
        let pool = db::connect(dir, false).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            pool,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record which embedding model produced the stored vectors.
    pub async fn set_embedding_model(&self, model: &str, dims: usize) -> Result<()> {
        self.set_meta(META_MODEL, model).await?;
        self.set_meta(META_DIMS, &dims.to_string()).await
    }

    /// Model name and dimensionality recorded at creation, if any.
    pub async fn embedding_model(&self) -> Result<Option<(String, usize)>> {
        let model = self.meta(META_MODEL).await?;
        let dims = self.meta(META_DIMS).await?;
        Ok(match (model, dims) {
            (Some(m), Some(d)) => Some((m, d.parse().unwrap_or(0))),
            _ => None,
        })
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT value FROM index_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<RuleChunk> {
    let category: String = row.get("category");
    let chunk_index: i64 = row.get("chunk_index");
    let total_chunks: i64 = row.get("total_chunks");

    Ok(RuleChunk {
        id: row.get("id"),
        text: row.get("text"),
        metadata: ChunkMetadata {
            source: row.get("source"),
            filename: row.get("filename"),
            category: category.parse()?,
            filetype: row.get("filetype"),
            chunk_index: chunk_index as usize,
            total_chunks: total_chunks as usize,
            timestamp: row.get("created_at"),
        },
        content_hash: row.get("content_hash"),
    })
}

const SELECT_CHUNK_COLUMNS: &str = "c.id, c.text, c.source, c.filename, c.category, c.filetype, \
     c.chunk_index, c.total_chunks, c.created_at, c.content_hash";

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add(&self, chunks: &[RuleChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let meta = &chunk.metadata;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, filename, category, filetype, chunk_index,
                                    total_chunks, created_at, text, content_hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&meta.source)
            .bind(&meta.filename)
            .bind(meta.category.as_str())
            .bind(&meta.filetype)
            .bind(meta.chunk_index as i64)
            .bind(meta.total_chunks as i64)
            .bind(&meta.timestamp)
            .bind(&chunk.text)
            .bind(&chunk.content_hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, cv.embedding FROM chunks c \
             JOIN chunk_vectors cv ON cv.chunk_id = c.id \
             ORDER BY c.rowid ASC",
            SELECT_CHUNK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            entries.push((row_to_chunk(row)?, blob_to_vec(&blob)));
        }

        Ok(rank(
            query,
            entries.iter().map(|(c, v)| (c, v.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE source = ?)",
        )
        .bind(source)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }

    async fn all_chunks(&self) -> Result<Vec<RuleChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks c ORDER BY c.rowid ASC",
            SELECT_CHUNK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }
}
