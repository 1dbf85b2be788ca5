//! Ingestion pipeline orchestration.
//!
//! Two entry points share the same per-file processing
//! (read → translate code → chunk → tag):
//!
//! - [`Pipeline::bootstrap`] walks the whole project and rebuilds the
//!   index from scratch.
//! - [`Pipeline::delta`] processes a [`ChangeSet`] and merges the result
//!   into the existing index, in append or upsert mode, after optionally
//!   pruning entries of deleted files.
//!
//! Delta runs apply the same discovery filters as bootstrap (root, ignored
//! directories, exclude globs, enabled extensions), so both only ever
//! index the same set of sources.
//!
//! Per-file failures (unreadable file, empty content) are logged, counted
//! in the report, and skipped. Files are processed one at a time in
//! discovery order.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::changes::{explicit_change_set, ChangeDetector};
use crate::chunk::{build_chunks, filetype_of, filename_of, Chunker};
use crate::config::{Config, DeltaMode};
use crate::discover::{categorize_files, category_for, extensions_for, source_label, Discoverer};
use crate::embedding::{create_embedder, DisabledEmbedder, Embedder};
use crate::generation::{create_generator, DisabledGenerator, Generator};
use crate::index::{IndexWriter, WriteOutcome};
use crate::models::{Category, ChangeSet, IngestionReport, RuleChunk, SourceFile};
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::store::SqliteIndex;
use crate::translate::RuleTranslator;

pub struct Pipeline<'a> {
    root: PathBuf,
    index_dir: PathBuf,
    categories: Vec<Category>,
    discoverer: Discoverer,
    chunker: Chunker,
    translator: RuleTranslator<'a>,
    writer: IndexWriter<'a>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &Config,
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
        progress: &'a dyn ProgressReporter,
    ) -> Result<Self> {
        Ok(Self {
            root: config.discovery.root.clone(),
            index_dir: config.index.path.clone(),
            categories: config.discovery.categories(),
            discoverer: Discoverer::from_config(&config.discovery)?,
            chunker: Chunker::from_config(&config.chunking),
            translator: RuleTranslator::new(generator, config.generation.translation_temperature),
            writer: IndexWriter::new(embedder, config.embedding.batch_size),
            progress,
        })
    }

    /// Use `root` instead of `[discovery] root` as the project root.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self
    }

    /// Read, translate (code only, when `translate` is set), chunk, and tag
    /// one file. Failures are counted in `report` and yield `None`.
    pub async fn process_file(
        &self,
        path: &Path,
        root: &Path,
        category: Category,
        translate: bool,
        report: &mut IngestionReport,
    ) -> Option<Vec<RuleChunk>> {
        match self.chunk_file(path, root, category, translate).await {
            Ok((chunks, fallback)) => {
                if fallback {
                    report.translation_fallbacks += 1;
                }
                Some(chunks)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                report.errors += 1;
                None
            }
        }
    }

    async fn chunk_file(
        &self,
        path: &Path,
        root: &Path,
        category: Category,
        translate: bool,
    ) -> Result<(Vec<RuleChunk>, bool)> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes).to_string();
        if content.trim().is_empty() {
            bail!("file is empty");
        }

        let file = SourceFile {
            path: path.to_path_buf(),
            source: source_label(path, root),
            category,
            content,
        };

        let (text, fallback) = if category == Category::Code && translate {
            let outcome = self
                .translator
                .translate(&file.content, &filename_of(&file), &filetype_of(&file))
                .await;
            let fallback = outcome.is_fallback();
            (outcome.into_text(), fallback)
        } else {
            (file.content.clone(), false)
        };

        let segments = self.chunker.split_text(&text);
        if segments.is_empty() {
            bail!("no content left to chunk");
        }
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok((build_chunks(&file, segments, &timestamp), fallback))
    }

    /// Full ingestion of the project root followed by an index rebuild.
    /// A dry run stops before translation and writing.
    pub async fn bootstrap(&self, dry_run: bool) -> Result<IngestionReport> {
        self.progress.report(ProgressEvent::Discovering {
            root: self.root.display().to_string(),
        });
        let files = self.discoverer.discover(&self.root)?;
        let root = self.root.canonicalize()?;
        let categorized = categorize_files(&files);

        let mut report = IngestionReport {
            total_files: categorized.len() as u64,
            ..IngestionReport::default()
        };
        info!(files = report.total_files, root = %root.display(), "discovered files");

        let total = report.total_files;
        let mut n = 0u64;
        let mut all_chunks = Vec::new();

        for category in &self.categories {
            for path in categorized.get(*category) {
                n += 1;
                self.progress.report(ProgressEvent::Processing {
                    n,
                    total,
                    path: source_label(path, &root),
                });
                if let Some(chunks) = self
                    .process_file(path, &root, *category, !dry_run, &mut report)
                    .await
                {
                    report.record_file(*category, chunks.len());
                    all_chunks.extend(chunks);
                }
            }
        }

        if dry_run {
            return Ok(report);
        }

        self.progress.report(ProgressEvent::Writing {
            chunks: all_chunks.len() as u64,
        });
        let (index, outcome) = self.writer.rebuild(&self.index_dir, &all_chunks).await?;
        info!(written = outcome.written, index = %self.index_dir.display(), "index rebuilt");
        index.close().await;

        Ok(report)
    }

    /// Incremental ingestion of `changes` into the existing index.
    pub async fn delta(
        &self,
        changes: &ChangeSet,
        mode: DeltaMode,
        prune_deleted: bool,
        dry_run: bool,
    ) -> Result<IngestionReport> {
        let root = self.root.canonicalize()?;
        let change_root = changes
            .root
            .canonicalize()
            .unwrap_or_else(|_| changes.root.clone());

        // Paths bootstrap would never index are dropped before anything else.
        let in_scope = |rel: &String| {
            let path = change_root.join(rel);
            if self.discoverer.accepts(&path, &root) {
                Some((rel.clone(), path))
            } else {
                debug!(path = rel.as_str(), "outside discovery scope; skipping");
                None
            }
        };
        let changed: Vec<(String, PathBuf)> = changes.changed.iter().filter_map(in_scope).collect();
        let deleted: Vec<String> = changes
            .deleted
            .iter()
            .filter_map(in_scope)
            .map(|(_, path)| source_label(&path, &root))
            .collect();

        let mut report = IngestionReport {
            total_files: changed.len() as u64,
            ..IngestionReport::default()
        };

        let index = if dry_run {
            None
        } else {
            Some(self.open_for_delta().await?)
        };

        if let (Some(index), true) = (&index, prune_deleted) {
            match self.writer.prune(index, &deleted).await {
                Ok(removed) => report.pruned_entries = removed,
                Err(e) => {
                    warn!(error = %e, "pruning deleted files failed");
                    report.errors += 1;
                }
            }
        }

        let total = report.total_files;
        for (i, (rel, path)) in changed.iter().enumerate() {
            self.progress.report(ProgressEvent::Processing {
                n: i as u64 + 1,
                total,
                path: rel.clone(),
            });

            if !path.is_file() {
                debug!(path = rel.as_str(), "changed file no longer exists; skipping");
                report.skipped_missing += 1;
                continue;
            }
            let category = match category_for(path) {
                Some(c) if self.categories.contains(&c) => c,
                _ => {
                    debug!(path = rel.as_str(), "unsupported or disabled category; skipping");
                    continue;
                }
            };

            let Some(chunks) = self
                .process_file(path, &root, category, !dry_run, &mut report)
                .await
            else {
                continue;
            };
            report.record_file(category, chunks.len());

            if let Some(index) = &index {
                let outcome = self.write_delta(index, mode, &chunks).await;
                report.errors += outcome.failed_batches;
            }
        }

        if let Some(index) = index {
            index.close().await;
        }
        Ok(report)
    }

    async fn write_delta(&self, index: &SqliteIndex, mode: DeltaMode, chunks: &[RuleChunk]) -> WriteOutcome {
        match (mode, chunks.first()) {
            (DeltaMode::Upsert, Some(first)) => {
                self.writer
                    .upsert(index, &first.metadata.source, chunks)
                    .await
            }
            _ => self.writer.append(index, chunks).await,
        }
    }

    async fn open_for_delta(&self) -> Result<SqliteIndex> {
        let embedder = self.writer.embedder();
        if !SqliteIndex::exists(&self.index_dir) {
            info!(index = %self.index_dir.display(), "no index yet; creating an empty one");
            let index = SqliteIndex::create(&self.index_dir).await?;
            index
                .set_embedding_model(embedder.model_name(), embedder.dims())
                .await?;
            return Ok(index);
        }

        let index = SqliteIndex::open(&self.index_dir).await?;
        if let Some((model, dims)) = index.embedding_model().await? {
            if model != embedder.model_name() || dims != embedder.dims() {
                warn!(
                    indexed_model = model.as_str(),
                    indexed_dims = dims,
                    configured_model = embedder.model_name(),
                    configured_dims = embedder.dims(),
                    "index was built with a different embedding model; run bootstrap to rebuild"
                );
            }
        }
        Ok(index)
    }
}

fn build_services(config: &Config, dry_run: bool) -> Result<(Box<dyn Embedder>, Box<dyn Generator>)> {
    if dry_run {
        return Ok((Box::new(DisabledEmbedder), Box::new(DisabledGenerator)));
    }
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    if !config.generation.is_enabled() && config.discovery.include_code {
        warn!("generation provider is disabled; code files will be indexed as raw source");
    }
    Ok((embedder, generator))
}

/// `rh bootstrap`: discover, process, and rebuild the index.
pub async fn run_bootstrap(
    config: &Config,
    root: Option<&Path>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<IngestionReport> {
    let (embedder, generator) = build_services(config, dry_run)?;
    let reporter = progress.reporter();

    let mut pipeline = Pipeline::new(config, embedder.as_ref(), generator.as_ref(), reporter.as_ref())?;
    if let Some(root) = root {
        pipeline = pipeline.with_root(root);
    }

    let report = pipeline.bootstrap(dry_run).await?;
    print_report(if dry_run { "bootstrap (dry-run)" } else { "bootstrap" }, &report);
    if !dry_run {
        println!("  index: {}", config.index.path.display());
    }
    Ok(report)
}

/// Options for `rh delta`.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Explicit file list; bypasses git when set.
    pub files: Option<Vec<PathBuf>>,
    pub base: String,
    pub compare: String,
    pub mode: DeltaMode,
    pub prune_deleted: bool,
    pub dry_run: bool,
}

impl DeltaOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            files: None,
            base: config.changes.base_ref.clone(),
            compare: config.changes.compare_ref.clone(),
            mode: config.changes.delta_mode,
            prune_deleted: config.changes.prune_deleted,
            dry_run: false,
        }
    }
}

/// `rh delta`: detect changes and merge them into the index.
pub async fn run_delta(config: &Config, options: &DeltaOptions, progress: ProgressMode) -> Result<IngestionReport> {
    let changes = match &options.files {
        Some(files) => explicit_change_set(
            &config.discovery.root,
            files,
            &extensions_for(&config.discovery.categories()),
        ),
        None => ChangeDetector::from_config(config).detect(&options.base, &options.compare)?,
    };

    if changes.is_empty() {
        println!("delta: no supported files changed");
        return Ok(IngestionReport::default());
    }

    let (embedder, generator) = build_services(config, options.dry_run)?;
    let reporter = progress.reporter();
    let pipeline = Pipeline::new(config, embedder.as_ref(), generator.as_ref(), reporter.as_ref())?;

    let report = pipeline
        .delta(&changes, options.mode, options.prune_deleted, options.dry_run)
        .await?;

    let title = match (options.dry_run, options.mode) {
        (true, _) => "delta (dry-run)",
        (false, DeltaMode::Append) => "delta (append)",
        (false, DeltaMode::Upsert) => "delta (upsert)",
    };
    print_report(title, &report);
    Ok(report)
}

pub fn print_report(title: &str, report: &IngestionReport) {
    println!("{}", title);
    println!("  files found: {}", report.total_files);
    println!("  files processed: {}", report.processed_files);
    println!("    code: {} ({} chunks)", report.code_files, report.code_chunks);
    println!("    doc: {} ({} chunks)", report.doc_files, report.doc_chunks);
    println!("    config: {} ({} chunks)", report.config_files, report.config_chunks);
    println!("  total chunks: {}", report.total_chunks);
    if report.translation_fallbacks > 0 {
        println!("  translation fallbacks: {}", report.translation_fallbacks);
    }
    if report.skipped_missing > 0 {
        println!("  skipped (missing on disk): {}", report.skipped_missing);
    }
    if report.pruned_entries > 0 {
        println!("  pruned entries: {}", report.pruned_entries);
    }
    println!("  errors: {}", report.errors);
    println!("{}", if report.is_clean() { "ok" } else { "completed with errors" });
}
