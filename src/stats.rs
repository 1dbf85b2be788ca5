//! Index statistics and validation.
//!
//! Summarises what the persisted index holds: chunk counts per category,
//! distinct sources, chunk length distribution, and the embedding model
//! recorded at build time. A chunk whose `chunk_index` is not below its
//! `total_chunks` is reported as malformed.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::models::{Category, RuleChunk};
use crate::store::{SqliteIndex, VectorIndex};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_chunks: u64,
    pub by_category: BTreeMap<Category, u64>,
    pub distinct_sources: u64,
    /// Chunk text length in characters.
    pub min_chars: usize,
    pub max_chars: usize,
    pub avg_chars: usize,
    pub malformed: u64,
}

impl IndexStats {
    pub fn compute(chunks: &[RuleChunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }

        let mut by_category = BTreeMap::new();
        let mut sources = HashSet::new();
        let mut lengths = Vec::with_capacity(chunks.len());
        let mut malformed = 0;

        for chunk in chunks {
            *by_category.entry(chunk.metadata.category).or_insert(0) += 1;
            sources.insert(chunk.metadata.source.as_str());
            lengths.push(chunk.text.chars().count());
            if chunk.metadata.chunk_index >= chunk.metadata.total_chunks {
                malformed += 1;
            }
        }

        let total: usize = lengths.iter().sum();
        Self {
            total_chunks: chunks.len() as u64,
            by_category,
            distinct_sources: sources.len() as u64,
            min_chars: lengths.iter().copied().min().unwrap_or(0),
            max_chars: lengths.iter().copied().max().unwrap_or(0),
            avg_chars: total / lengths.len(),
            malformed,
        }
    }
}

/// `rh stats`: load the index and print its summary.
pub async fn run_stats(config: &Config) -> Result<IndexStats> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let stats = IndexStats::compute(&index.all_chunks().await?);
    let model = index.embedding_model().await?;
    let db_size = std::fs::metadata(db::db_path(index.dir()))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Rule Harness: Index Stats");
    println!("=========================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    if let Some((name, dims)) = model {
        println!("  Embeddings:  {} ({} dims)", name, dims);
    }
    println!();
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Sources:     {}", stats.distinct_sources);
    for category in Category::ALL {
        println!(
            "    {:<10} {}",
            category.as_str(),
            stats.by_category.get(&category).copied().unwrap_or(0)
        );
    }
    if stats.total_chunks > 0 {
        println!();
        println!(
            "  Chunk size:  min {} / max {} / avg {} chars",
            stats.min_chars, stats.max_chars, stats.avg_chars
        );
    }
    if stats.malformed > 0 {
        println!("  Malformed:   {} chunks with chunk_index >= total_chunks", stats.malformed);
    }
    println!();

    index.close().await;
    Ok(stats)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
