//! End-to-end tests of the ingestion and query pipeline through the
//! library API, with deterministic stand-ins for the embedding and
//! generation services.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use rule_harness::chunk::{chunk_header, Chunker};
use rule_harness::config::{Config, DeltaMode};
use rule_harness::embedding::Embedder;
use rule_harness::generation::Generator;
use rule_harness::ingest::Pipeline;
use rule_harness::models::ChangeSet;
use rule_harness::plan::PlanGenerator;
use rule_harness::progress::NoProgress;
use rule_harness::retrieve::Retriever;
use rule_harness::store::{SqliteIndex, VectorIndex};
use tempfile::TempDir;

// ─── Service doubles ────────────────────────────────────────────────

const DIMS: usize = 64;

/// Hashes lowercase words into a fixed number of buckets.
struct BagOfWords;

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let h = word
            .bytes()
            .fold(2_166_136_261u32, |h, b| (h ^ b as u32).wrapping_mul(16_777_619));
        v[(h as usize) % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Answers rule-translation prompts with canned rules and plan prompts
/// with one scenario per context line that states a rule.
struct ScriptedGenerator;

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        if prompt.contains("BDD TEST PLAN") {
            let mut plan = String::from("Feature: Generated plan\n");
            for line in prompt.lines().filter(|l| l.starts_with("Rule ")) {
                plan.push_str(&format!("  Scenario: covers {}\n", line));
            }
            return Ok(plan);
        }
        if prompt.contains("FREE_SHIPPING_THRESHOLD") {
            return Ok("Rule 1: Orders above R$1000 get free shipping.\n\
                       Rule 2: Orders up to R$1000 pay a flat shipping fee of R$25."
                .to_string());
        }
        Ok("Rule 1: Every order must have at least one item.".to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        anyhow::bail!("rate limited")
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

const SHIPPING_PY: &str = "FREE_SHIPPING_THRESHOLD = 1000\n\n\
def shipping_fee(order_total):\n    \
    if order_total > FREE_SHIPPING_THRESHOLD:\n        return 0\n    return 25\n";

const SHIPPING_MD: &str = "# Shipping policy\n\n\
Orders above R$1000 ship for free.\n\n\
Smaller orders pay a flat shipping fee.";

const ORDERS_PY: &str = "def validate(order):\n    if not order.items:\n        raise ValueError('empty order')\n";

const FAQ_MD: &str = "# FAQ\n\nReturns are accepted within 30 days.";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("project");
    write(&project, "src/shipping.py", SHIPPING_PY);
    write(&project, "src/orders.py", ORDERS_PY);
    write(&project, "docs/shipping.md", SHIPPING_MD);
    write(&project, "docs/faq.md", FAQ_MD);
    write(&project, "assets/logo.png", "not really a png");

    let mut config = Config::default();
    config.index.path = tmp.path().join("rule_index");
    config.discovery.root = project;
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 40;
    (tmp, config)
}

fn project_root(config: &Config) -> PathBuf {
    config.discovery.root.canonicalize().unwrap()
}

fn changes(config: &Config, changed: &[&str], deleted: &[&str]) -> ChangeSet {
    ChangeSet {
        root: project_root(config),
        changed: changed.iter().map(|s| s.to_string()).collect(),
        deleted: deleted.iter().map(|s| s.to_string()).collect(),
    }
}

async fn bootstrap(config: &Config, generator: &dyn Generator) -> rule_harness::models::IngestionReport {
    let embedder = BagOfWords;
    let pipeline = Pipeline::new(config, &embedder, generator, &NoProgress).unwrap();
    pipeline.bootstrap(false).await.unwrap()
}

async fn delta(
    config: &Config,
    set: &ChangeSet,
    mode: DeltaMode,
    prune: bool,
) -> rule_harness::models::IngestionReport {
    let embedder = BagOfWords;
    let generator = ScriptedGenerator;
    let pipeline = Pipeline::new(config, &embedder, &generator, &NoProgress).unwrap();
    pipeline.delta(set, mode, prune, false).await.unwrap()
}

async fn sources_in(config: &Config) -> BTreeMap<String, usize> {
    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let mut counts = BTreeMap::new();
    for chunk in index.all_chunks().await.unwrap() {
        *counts.entry(chunk.metadata.source).or_insert(0) += 1;
    }
    index.close().await;
    counts
}

// ─── Bootstrap ──────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_reports_per_category_counts() {
    let (_tmp, config) = setup();
    let report = bootstrap(&config, &ScriptedGenerator).await;

    assert_eq!(report.total_files, 4);
    assert_eq!(report.processed_files, 4);
    assert_eq!(report.code_files, 2);
    assert_eq!(report.doc_files, 2);
    assert_eq!(report.config_files, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(
        report.total_chunks,
        report.code_chunks + report.doc_chunks + report.config_chunks
    );

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    assert_eq!(index.count().await.unwrap(), report.total_chunks);
}

#[tokio::test]
async fn rebuild_leaves_no_entries_from_previous_index() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;
    assert!(sources_in(&config).await.contains_key("docs/faq.md"));

    let project = project_root(&config);
    fs::remove_file(project.join("docs/faq.md")).unwrap();
    write(&project, "docs/returns.md", "Refunds are issued within 5 days.");

    let report = bootstrap(&config, &ScriptedGenerator).await;
    let sources = sources_in(&config).await;

    let expected: BTreeSet<&str> = [
        "docs/returns.md",
        "docs/shipping.md",
        "src/orders.py",
        "src/shipping.py",
    ]
    .into_iter()
    .collect();
    assert_eq!(sources.keys().map(|s| s.as_str()).collect::<BTreeSet<_>>(), expected);
    assert_eq!(sources.values().sum::<usize>() as u64, report.total_chunks);
}

#[tokio::test]
async fn persisted_chunk_indices_are_well_formed() {
    let (_tmp, mut config) = setup();
    config.chunking.chunk_size = 40;
    config.chunking.chunk_overlap = 10;
    bootstrap(&config, &ScriptedGenerator).await;

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let mut by_source: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();
    for chunk in index.all_chunks().await.unwrap() {
        by_source
            .entry(chunk.metadata.source.clone())
            .or_default()
            .push((chunk.metadata.chunk_index, chunk.metadata.total_chunks));
    }

    assert!(by_source.values().any(|v| v.len() > 1));
    for (source, entries) in by_source {
        let total = entries[0].1;
        assert!(entries.iter().all(|(_, t)| *t == total), "{}", source);
        let indices: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..total).collect::<Vec<_>>(), "{}", source);
    }
}

#[tokio::test]
async fn translation_failure_indexes_raw_source() {
    let (_tmp, config) = setup();
    let report = bootstrap(&config, &FailingGenerator).await;
    assert_eq!(report.translation_fallbacks, 2);
    assert_eq!(report.errors, 0);

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let stored: Vec<String> = index
        .all_chunks()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.metadata.source == "src/orders.py")
        .map(|c| c.text)
        .collect();

    let segments = Chunker::from_config(&config.chunking).split_text(ORDERS_PY);
    let expected: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}{}", chunk_header("orders.py", "code", i, segments.len()), s))
        .collect();
    assert!(!expected.is_empty());
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn empty_file_is_counted_as_error_and_skipped() {
    let (_tmp, config) = setup();
    write(&project_root(&config), "docs/empty.md", "   \n");

    let report = bootstrap(&config, &ScriptedGenerator).await;
    assert_eq!(report.total_files, 5);
    assert_eq!(report.processed_files, 4);
    assert_eq!(report.errors, 1);
    assert!(!sources_in(&config).await.contains_key("docs/empty.md"));
}

#[tokio::test]
async fn dry_run_does_not_touch_the_index() {
    let (_tmp, config) = setup();
    let embedder = BagOfWords;
    let generator = FailingGenerator;
    let pipeline = Pipeline::new(&config, &embedder, &generator, &NoProgress).unwrap();

    let report = pipeline.bootstrap(true).await.unwrap();
    assert_eq!(report.processed_files, 4);
    assert_eq!(report.translation_fallbacks, 0);
    assert!(!SqliteIndex::exists(&config.index.path));
}

// ─── Delta ──────────────────────────────────────────────────────────

#[tokio::test]
async fn append_grows_by_exactly_the_new_chunks() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let before = index.all_chunks().await.unwrap();
    index.close().await;

    let report = delta(
        &config,
        &changes(&config, &["docs/faq.md", "src/orders.py"], &[]),
        DeltaMode::Append,
        true,
    )
    .await;
    assert_eq!(report.processed_files, 2);

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let after = index.all_chunks().await.unwrap();
    assert_eq!(after.len() as u64, before.len() as u64 + report.total_chunks);
    assert_eq!(&after[..before.len()], &before[..]);
}

#[tokio::test]
async fn upsert_replaces_entries_of_changed_files() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;
    let before = sources_in(&config).await;

    let long_faq = (0..20)
        .map(|i| format!("Question {} has a fairly long answer attached to it.", i))
        .collect::<Vec<_>>()
        .join("\n\n");
    write(&project_root(&config), "docs/faq.md", &long_faq);

    let report = delta(
        &config,
        &changes(&config, &["docs/faq.md"], &[]),
        DeltaMode::Upsert,
        true,
    )
    .await;
    let after = sources_in(&config).await;

    assert_eq!(after["docs/faq.md"] as u64, report.total_chunks);
    assert!(after["docs/faq.md"] > before["docs/faq.md"]);
    assert_eq!(after["src/shipping.py"], before["src/shipping.py"]);

    // Running the same upsert again does not accumulate duplicates.
    delta(
        &config,
        &changes(&config, &["docs/faq.md"], &[]),
        DeltaMode::Upsert,
        true,
    )
    .await;
    assert_eq!(sources_in(&config).await, after);
}

#[tokio::test]
async fn missing_changed_file_is_skipped_without_mutation() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;
    let before = sources_in(&config).await;

    let report = delta(
        &config,
        &changes(&config, &["src/gone.py"], &[]),
        DeltaMode::Upsert,
        true,
    )
    .await;

    assert_eq!(report.skipped_missing, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.processed_files, 0);
    assert_eq!(sources_in(&config).await, before);
}

#[tokio::test]
async fn deleted_files_are_pruned_before_additions() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;
    let before = sources_in(&config).await;

    let project = project_root(&config);
    fs::remove_file(project.join("docs/faq.md")).unwrap();

    let report = delta(
        &config,
        &changes(&config, &[], &["docs/faq.md"]),
        DeltaMode::Upsert,
        true,
    )
    .await;
    assert_eq!(report.pruned_entries as usize, before["docs/faq.md"]);
    assert!(!sources_in(&config).await.contains_key("docs/faq.md"));
}

#[tokio::test]
async fn pruning_can_be_disabled() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;
    let before = sources_in(&config).await;

    let report = delta(
        &config,
        &changes(&config, &[], &["docs/faq.md"]),
        DeltaMode::Append,
        false,
    )
    .await;
    assert_eq!(report.pruned_entries, 0);
    assert_eq!(sources_in(&config).await, before);
}

#[tokio::test]
async fn delta_ignores_paths_bootstrap_would_skip() {
    let (tmp, mut config) = setup();
    config.discovery.exclude_globs = vec!["**/*_test.py".to_string()];
    let project = config.discovery.root.clone();
    write(&project, "node_modules/pkg/index.js", "module.exports = 1;\n");
    write(&project, "src/orders_test.py", "def test_validate():\n    assert True\n");
    write(tmp.path(), "outside/tool.py", "LIMIT = 3\n");

    bootstrap(&config, &ScriptedGenerator).await;
    let before: BTreeSet<String> = sources_in(&config).await.into_keys().collect();
    assert!(!before.contains("node_modules/pkg/index.js"));
    assert!(!before.contains("src/orders_test.py"));

    // Paths relative to a repository root one level above the project.
    let set = ChangeSet {
        root: tmp.path().canonicalize().unwrap(),
        changed: vec![
            "project/node_modules/pkg/index.js".to_string(),
            "project/src/orders_test.py".to_string(),
            "outside/tool.py".to_string(),
            "project/src/orders.py".to_string(),
        ],
        deleted: vec!["project/node_modules/pkg/old.js".to_string()],
    };
    let report = delta(&config, &set, DeltaMode::Upsert, true).await;

    assert_eq!(report.total_files, 1);
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.skipped_missing, 0);
    assert_eq!(report.errors, 0);
    let after: BTreeSet<String> = sources_in(&config).await.into_keys().collect();
    assert_eq!(after, before);
}

#[tokio::test]
async fn delta_without_index_creates_one() {
    let (_tmp, config) = setup();
    let report = delta(
        &config,
        &changes(&config, &["docs/shipping.md"], &[]),
        DeltaMode::Append,
        true,
    )
    .await;

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    assert_eq!(index.count().await.unwrap(), report.total_chunks);
    assert_eq!(
        index.embedding_model().await.unwrap(),
        Some(("bag-of-words".to_string(), DIMS))
    );
}

// ─── Retrieval and plans ────────────────────────────────────────────

#[tokio::test]
async fn retrieval_returns_min_of_index_size_and_k() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let n = index.count().await.unwrap() as usize;
    let embedder = BagOfWords;

    for k in [1, 2, n, n + 10] {
        let hits = Retriever::new(&index, &embedder, k)
            .retrieve("shipping fee")
            .await
            .unwrap();
        assert_eq!(hits.len(), k.min(n));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[tokio::test]
async fn shipping_threshold_flows_from_code_to_plan() {
    let (_tmp, config) = setup();
    bootstrap(&config, &ScriptedGenerator).await;

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    let embedder = BagOfWords;
    let generator = ScriptedGenerator;
    let retriever = Retriever::new(&index, &embedder, 5);
    let planner = PlanGenerator::new(retriever, &generator, 0.2);

    let plan = planner
        .generate("shipping rules for large orders")
        .await
        .unwrap();

    assert!(!plan.sources.is_empty());
    assert!(plan.sources.len() <= 5);
    assert!(plan.sources.iter().any(|s| s.text.contains("1000")));
    assert!(plan.plan.contains("Scenario"));
    assert!(plan.plan.contains("R$1000"));
    assert!(plan
        .sources
        .iter()
        .any(|s| s.metadata.source == "src/shipping.py"));
}
