//! In-memory [`VectorIndex`] for tests and dry experiments.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{check_lengths, rank, VectorIndex};
use crate::models::{RetrievedChunk, RuleChunk};

struct Entry {
    chunk: RuleChunk,
    vector: Vec<f32>,
}

pub struct InMemoryIndex {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Entry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Entry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, chunks: &[RuleChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut entries = self.write()?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(Entry {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let entries = self.read()?;
        Ok(rank(
            query,
            entries.iter().map(|e| (&e.chunk, e.vector.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|e| e.chunk.metadata.source != source);
        Ok((before - entries.len()) as u64)
    }

    async fn all_chunks(&self) -> Result<Vec<RuleChunk>> {
        Ok(self.read()?.iter().map(|e| e.chunk.clone()).collect())
    }
}
