//! Core data models used throughout Rule Harness.
//!
//! These types represent the files, chunks, reports, and retrieval results
//! that flow through the ingestion and query pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Category a source file is classified into by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Doc,
    Config,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Code, Category::Doc, Category::Config];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Doc => "doc",
            Category::Config => "config",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "code" => Ok(Category::Code),
            "doc" => Ok(Category::Doc),
            "config" => Ok(Category::Config),
            other => anyhow::bail!("Unknown category: '{}'", other),
        }
    }
}

/// A file read once during an ingestion pass.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Root-relative path with forward slashes; the identity used in the index.
    pub source: String,
    pub category: Category,
    pub content: String,
}

/// Metadata persisted alongside every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub filetype: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
}

/// The unit of persistence: header-prefixed text plus traceability metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `text`.
    pub content_hash: String,
}

/// Counts gathered during one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub total_files: u64,
    pub processed_files: u64,
    pub code_files: u64,
    pub doc_files: u64,
    pub config_files: u64,
    pub total_chunks: u64,
    pub code_chunks: u64,
    pub doc_chunks: u64,
    pub config_chunks: u64,
    pub errors: u64,
    pub translation_fallbacks: u64,
    pub skipped_missing: u64,
    pub pruned_entries: u64,
}

impl IngestionReport {
    /// Record a successfully processed file and the chunks it produced.
    pub fn record_file(&mut self, category: Category, chunks: usize) {
        let chunks = chunks as u64;
        self.processed_files += 1;
        self.total_chunks += chunks;
        match category {
            Category::Code => {
                self.code_files += 1;
                self.code_chunks += chunks;
            }
            Category::Doc => {
                self.doc_files += 1;
                self.doc_chunks += chunks;
            }
            Category::Config => {
                self.config_files += 1;
                self.config_chunks += chunks;
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Paths that differ between two reference points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Directory the paths are relative to.
    pub root: PathBuf,
    /// Added, modified, copied, or rename-target paths, in diff order.
    pub changed: Vec<String>,
    /// Deleted paths and rename sources.
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query embedding.
    pub score: f32,
}

/// A generated test plan and the exact chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct TestPlan {
    pub query: String,
    pub plan: String,
    pub sources: Vec<RetrievedChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_roundtrips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("binary".parse::<Category>().is_err());
    }

    #[test]
    fn metadata_serializes_category_as_type() {
        let meta = ChunkMetadata {
            source: "src/a.py".into(),
            filename: "a.py".into(),
            category: Category::Code,
            filetype: ".py".into(),
            chunk_index: 0,
            total_chunks: 1,
            timestamp: "2024-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "code");
        assert_eq!(json["chunk_index"], 0);
    }

    #[test]
    fn report_tracks_categories() {
        let mut report = IngestionReport::default();
        report.record_file(Category::Code, 3);
        report.record_file(Category::Doc, 2);
        report.record_file(Category::Config, 1);
        assert_eq!(report.processed_files, 3);
        assert_eq!(report.total_chunks, 6);
        assert_eq!(report.code_chunks, 3);
        assert_eq!(report.doc_files, 1);
        assert_eq!(report.config_chunks, 1);
        assert!(report.is_clean());
    }
}
