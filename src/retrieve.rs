//! Query-time retrieval.
//!
//! The query is embedded with the same service used at ingestion and the
//! `k` nearest chunks are returned best first. No score threshold applies:
//! an index holding `n` entries yields `min(n, k)` results.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::models::RetrievedChunk;
use crate::store::{SqliteIndex, VectorIndex};

pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn VectorIndex, embedder: &'a dyn Embedder, k: usize) -> Self {
        Self { index, embedder, k }
    }

    /// The `k` chunks nearest to `query`. A blank query returns nothing.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder, query).await?;
        self.index.similarity_search(&vector, self.k).await
    }
}

/// `rh search`: print the ranked chunks for a query.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::new(&index, embedder.as_ref(), k.unwrap_or(config.retrieval.top_k));

    let results = retriever.retrieve(query).await?;
    if results.is_empty() {
        println!("No results.");
    }
    for (i, hit) in results.iter().enumerate() {
        let meta = &hit.metadata;
        println!(
            "{}. [{:.3}] {}  ({}, chunk {}/{})",
            i + 1,
            hit.score,
            meta.source,
            meta.category,
            meta.chunk_index + 1,
            meta.total_chunks
        );
        println!("    {}", snippet(&hit.text, 240));
    }

    index.close().await;
    Ok(())
}

/// First `max_chars` characters on one line.
pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ChunkMetadata, RuleChunk};
    use crate::store::InMemoryIndex;
    use async_trait::async_trait;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("ship") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn chunk(text: &str) -> RuleChunk {
        RuleChunk {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: format!("{}.md", text),
                filename: format!("{}.md", text),
                category: Category::Doc,
                filetype: ".md".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                timestamp: "2024-01-01T00:00:00Z".to_string(),
            },
            content_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn returns_min_of_n_and_k() {
        let index = InMemoryIndex::new();
        index
            .add(&[chunk("shipping"), chunk("billing")], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();

        let retriever = Retriever::new(&index, &AxisEmbedder, 5);
        let hits = retriever.retrieve("shipping rules").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "shipping");

        let retriever = Retriever::new(&index, &AxisEmbedder, 1);
        assert_eq!(retriever.retrieve("shipping").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let index = InMemoryIndex::new();
        index.add(&[chunk("a")], &[vec![1.0, 0.0]]).await.unwrap();
        let retriever = Retriever::new(&index, &AxisEmbedder, 5);
        assert!(retriever.retrieve("   ").await.unwrap().is_empty());
    }

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n  b", 10), "a b");
        assert_eq!(snippet("abcdef", 3), "abc...");
    }
}
