//! Index writer: turns chunks into embeddings and persists them.
//!
//! Three write paths:
//!
//! - **Rebuild**: every chunk is embedded up front; only when all batches
//!   succeed is the old index directory removed and a new one written in a
//!   single transaction. Any failure aborts and leaves the previous index
//!   untouched.
//! - **Append**: chunks are embedded and added batch by batch. A failed
//!   batch is logged and counted; batches already added stay.
//! - **Upsert**: one source at a time, its new chunks are embedded, then
//!   its existing entries are deleted and the new ones added.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::models::RuleChunk;
use crate::store::{SqliteIndex, VectorIndex};

/// Counts from one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: u64,
    pub failed_batches: u64,
    pub failed_chunks: u64,
    pub removed: u64,
}

impl WriteOutcome {
    pub fn merge(&mut self, other: WriteOutcome) {
        self.written += other.written;
        self.failed_batches += other.failed_batches;
        self.failed_chunks += other.failed_chunks;
        self.removed += other.removed;
    }
}

pub struct IndexWriter<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
}

impl<'a> IndexWriter<'a> {
    pub fn new(embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder
    }

    async fn embed_batch(&self, batch: &[RuleChunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        Ok(vectors)
    }

    /// Replace the index at `dir` with exactly `chunks`.
    pub async fn rebuild(&self, dir: &Path, chunks: &[RuleChunk]) -> Result<(SqliteIndex, WriteOutcome)> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (n, batch) in chunks.chunks(self.batch_size).enumerate() {
            debug!(batch = n, size = batch.len(), "embedding batch");
            let batch_vectors = self
                .embed_batch(batch)
                .await
                .with_context(|| format!("Embedding failed during rebuild (batch {})", n))?;
            vectors.extend(batch_vectors);
        }

        let index = SqliteIndex::create(dir).await?;
        index
            .set_embedding_model(self.embedder.model_name(), self.embedder.dims())
            .await?;
        index
            .add(chunks, &vectors)
            .await
            .context("Failed to write rebuilt index")?;

        Ok((
            index,
            WriteOutcome {
                written: chunks.len() as u64,
                ..WriteOutcome::default()
            },
        ))
    }

    /// Add `chunks` to `index` without touching existing entries.
    pub async fn append(&self, index: &dyn VectorIndex, chunks: &[RuleChunk]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        for batch in chunks.chunks(self.batch_size) {
            let result = match self.embed_batch(batch).await {
                Ok(vectors) => index.add(batch, &vectors).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => outcome.written += batch.len() as u64,
                Err(e) => {
                    warn!(size = batch.len(), error = %e, "append batch failed");
                    outcome.failed_batches += 1;
                    outcome.failed_chunks += batch.len() as u64;
                }
            }
        }
        outcome
    }

    /// Replace every entry of `source` with `chunks`. Nothing is removed
    /// unless the new chunks were embedded successfully.
    pub async fn upsert(&self, index: &dyn VectorIndex, source: &str, chunks: &[RuleChunk]) -> WriteOutcome {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            match self.embed_batch(batch).await {
                Ok(v) => vectors.extend(v),
                Err(e) => {
                    warn!(source, error = %e, "embedding failed; keeping existing entries");
                    return WriteOutcome {
                        failed_batches: 1,
                        failed_chunks: chunks.len() as u64,
                        ..WriteOutcome::default()
                    };
                }
            }
        }

        let mut outcome = WriteOutcome::default();
        match index.delete_by_source(source).await {
            Ok(removed) => outcome.removed = removed,
            Err(e) => {
                warn!(source, error = %e, "failed to remove previous entries");
                outcome.failed_batches = 1;
                outcome.failed_chunks = chunks.len() as u64;
                return outcome;
            }
        }

        match index.add(chunks, &vectors).await {
            Ok(()) => outcome.written = chunks.len() as u64,
            Err(e) => {
                warn!(source, error = %e, "failed to add upserted chunks");
                outcome.failed_batches = 1;
                outcome.failed_chunks = chunks.len() as u64;
            }
        }
        outcome
    }

    /// Remove all entries of each source in `sources`.
    pub async fn prune(&self, index: &dyn VectorIndex, sources: &[String]) -> Result<u64> {
        let mut removed = 0;
        for source in sources {
            let n = index.delete_by_source(source).await?;
            debug!(source = source.as_str(), removed = n, "pruned deleted source");
            removed += n;
        }
        Ok(removed)
    }
}
