//! Export the persisted index as JSON.
//!
//! Produces every chunk with its metadata, in insertion order. Embeddings
//! are not included.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::models::RuleChunk;
use crate::store::{SqliteIndex, VectorIndex};

#[derive(Serialize)]
struct ExportData {
    index: String,
    embedding_model: Option<String>,
    total_chunks: usize,
    chunks: Vec<RuleChunk>,
}

/// Export all chunks as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let chunks = index.all_chunks().await?;
    let embedding_model = index.embedding_model().await?.map(|(name, _)| name);
    index.close().await;

    let data = ExportData {
        index: config.index.path.display().to_string(),
        embedding_model,
        total_chunks: chunks.len(),
        chunks,
    };
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} chunks to {}", data.total_chunks, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
