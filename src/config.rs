//! TOML configuration for Rule Harness.
//!
//! Every section has defaults, so a config file only needs the values that
//! differ from them. [`load_config`] parses and validates the file; service
//! clients are then built from the relevant section and handed to the
//! pipeline components explicitly.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Category;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub changes: ChangesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted index.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./rule_index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_true")]
    pub include_code: bool,
    #[serde(default = "default_true")]
    pub include_docs: bool,
    #[serde(default)]
    pub include_config: bool,
    /// Directory names pruned in addition to the built-in ignore set.
    #[serde(default)]
    pub extra_ignore_dirs: Vec<String>,
    /// Glob patterns matched against root-relative paths.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_code: true,
            include_docs: true,
            include_config: false,
            extra_ignore_dirs: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Categories enabled for ingestion, in processing order.
    pub fn categories(&self) -> Vec<Category> {
        let mut out = Vec::new();
        if self.include_code {
            out.push(Category::Code);
        }
        if self.include_docs {
            out.push(Category::Doc);
        }
        if self.include_config {
            out.push(Category::Config);
        }
        out
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separator() -> String {
    "\n\n".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible endpoint or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_translation_temperature")]
    pub translation_temperature: f32,
    #[serde(default = "default_plan_temperature")]
    pub plan_temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            translation_temperature: default_translation_temperature(),
            plan_temperature: default_plan_temperature(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_translation_temperature() -> f32 {
    0.1
}
fn default_plan_temperature() -> f32 {
    0.2
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    120
}

/// How a delta run merges new chunks into the existing index.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    /// Add chunks without touching existing entries (duplicates accumulate).
    Append,
    /// Replace all entries of each changed source before adding its chunks.
    Upsert,
}

impl std::str::FromStr for DeltaMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append" => Ok(DeltaMode::Append),
            "upsert" => Ok(DeltaMode::Upsert),
            other => bail!("Unknown delta mode: '{}'. Use append or upsert.", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChangesConfig {
    #[serde(default = "default_root")]
    pub repo: PathBuf,
    #[serde(default = "default_base_ref")]
    pub base_ref: String,
    #[serde(default = "default_compare_ref")]
    pub compare_ref: String,
    #[serde(default = "default_delta_mode")]
    pub delta_mode: DeltaMode,
    #[serde(default = "default_true")]
    pub prune_deleted: bool,
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self {
            repo: default_root(),
            base_ref: default_base_ref(),
            compare_ref: default_compare_ref(),
            delta_mode: default_delta_mode(),
            prune_deleted: true,
        }
    }
}

fn default_base_ref() -> String {
    "HEAD^".to_string()
}
fn default_compare_ref() -> String {
    "HEAD".to_string()
}
fn default_delta_mode() -> DeltaMode {
    DeltaMode::Upsert
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.generation.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    config.generation.provider
                );
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.discovery.categories().is_empty() {
        bail!("discovery must include at least one of code, docs, or config");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.separator, "\n\n");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.changes.base_ref, "HEAD^");
        assert_eq!(config.changes.compare_ref, "HEAD");
        assert_eq!(config.changes.delta_mode, DeltaMode::Upsert);
        assert_eq!(
            config.discovery.categories(),
            vec![Category::Code, Category::Doc]
        );
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = parse("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn openai_embedding_requires_model_and_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let err =
            parse("[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n")
                .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn unknown_generation_provider_rejected() {
        let err = parse("[generation]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn delta_mode_parses_lowercase() {
        let config = parse("[changes]\ndelta_mode = \"append\"\n").unwrap();
        assert_eq!(config.changes.delta_mode, DeltaMode::Append);
        assert!("bogus".parse::<DeltaMode>().is_err());
    }

    #[test]
    fn all_categories_disabled_rejected() {
        let err = parse("[discovery]\ninclude_code = false\ninclude_docs = false\n").unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }
}
