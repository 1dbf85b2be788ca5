//! Vector index capability.
//!
//! The [`VectorIndex`] trait is the only way the pipeline touches persisted
//! chunks: store chunks with their embeddings, search by embedding, count,
//! and remove every entry of one source. Backends:
//!
//! - [`sqlite::SqliteIndex`]: `index.sqlite` inside the index directory.
//! - [`memory::InMemoryIndex`]: process-local, used by tests.
//!
//! Both search by brute-force cosine similarity and break score ties by
//! insertion order.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{RetrievedChunk, RuleChunk};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `chunks` with their embeddings. Existing entries are untouched.
    async fn add(&self, chunks: &[RuleChunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// The `k` entries most similar to `query`, best first.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    async fn count(&self) -> Result<u64>;

    /// Remove every entry whose `source` equals `source`; returns how many.
    async fn delete_by_source(&self, source: &str) -> Result<u64>;

    /// All stored chunks in insertion order.
    async fn all_chunks(&self) -> Result<Vec<RuleChunk>>;
}

pub(crate) fn check_lengths(chunks: &[RuleChunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

/// Score `entries` against `query` and keep the top `k`. The sort is
/// stable, so equal scores keep insertion order.
pub(crate) fn rank<'a, I>(query: &[f32], entries: I, k: usize) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = (&'a RuleChunk, &'a [f32])>,
{
    let mut scored: Vec<RetrievedChunk> = entries
        .into_iter()
        .map(|(chunk, vector)| RetrievedChunk {
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            score: cosine_similarity(query, vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
