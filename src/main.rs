//! # Rule Harness CLI (`rh`)
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/rh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh bootstrap` | Scan the project and rebuild the index |
//! | `rh delta` | Ingest changed files into the existing index |
//! | `rh changes` | Show the files a delta run would process |
//! | `rh search "<query>"` | Show the nearest chunks for a query |
//! | `rh plan "<query>"` | Generate a test plan from the nearest rules |
//! | `rh stats` | Summarise the index |
//! | `rh export` | Dump all chunks as JSON |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default: `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rule_harness::changes::ChangeDetector;
use rule_harness::config::{self, DeltaMode};
use rule_harness::ingest::{self, DeltaOptions};
use rule_harness::progress::ProgressMode;
use rule_harness::{export, plan, retrieve, stats};

/// Rule Harness: business rules extracted from code and docs, retrieved
/// to ground generated test plans.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Rule Harness: a business-rule knowledge base for test planning",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, translate, and chunk the whole project, then rebuild the
    /// index from scratch.
    Bootstrap {
        /// Project root; overrides `[discovery] root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Report file and chunk counts without calling services or
        /// touching the index.
        #[arg(long)]
        dry_run: bool,

        /// Skip code files.
        #[arg(long)]
        no_code: bool,

        /// Skip documentation files.
        #[arg(long)]
        no_docs: bool,

        /// Include configuration files.
        #[arg(long)]
        include_config: bool,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to
        /// `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Ingest files changed between two git revisions (or an explicit
    /// list) into the existing index.
    Delta {
        /// Process these files instead of asking git.
        #[arg(long, num_args = 1..)]
        files: Option<Vec<PathBuf>>,

        /// Base revision; overrides `[changes] base_ref`.
        #[arg(long)]
        base: Option<String>,

        /// Compare revision; overrides `[changes] compare_ref`.
        #[arg(long)]
        compare: Option<String>,

        /// `append` or `upsert`; overrides `[changes] delta_mode`.
        #[arg(long)]
        mode: Option<DeltaMode>,

        /// Keep index entries of deleted files.
        #[arg(long)]
        no_prune: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Print the supported files changed between two git revisions.
    Changes {
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        compare: Option<String>,
    },

    /// Retrieve the chunks nearest to a query.
    Search {
        query: String,

        /// Number of results; overrides `[retrieval] top_k`.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Generate a Gherkin test plan grounded in the retrieved rules.
    Plan {
        query: String,

        #[arg(short, long)]
        k: Option<usize>,

        /// Print the plan and its sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Export all chunks with metadata as JSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Bootstrap {
            root,
            dry_run,
            no_code,
            no_docs,
            include_config,
            progress,
        } => {
            cfg.discovery.include_code &= !no_code;
            cfg.discovery.include_docs &= !no_docs;
            cfg.discovery.include_config |= include_config;
            config::validate(&cfg)?;

            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let report = ingest::run_bootstrap(&cfg, root.as_deref(), dry_run, progress).await?;
            if !report.is_clean() || (!dry_run && report.total_chunks == 0) {
                std::process::exit(1);
            }
        }
        Commands::Delta {
            files,
            base,
            compare,
            mode,
            no_prune,
            dry_run,
            progress,
        } => {
            let mut options = DeltaOptions::from_config(&cfg);
            options.files = files;
            if let Some(base) = base {
                options.base = base;
            }
            if let Some(compare) = compare {
                options.compare = compare;
            }
            if let Some(mode) = mode {
                options.mode = mode;
            }
            options.prune_deleted &= !no_prune;
            options.dry_run = dry_run;

            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let report = ingest::run_delta(&cfg, &options, progress).await?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Changes { base, compare } => {
            let base = base.unwrap_or_else(|| cfg.changes.base_ref.clone());
            let compare = compare.unwrap_or_else(|| cfg.changes.compare_ref.clone());
            let changes = ChangeDetector::from_config(&cfg).detect(&base, &compare)?;

            println!("changes {}..{}", base, compare);
            println!("  root: {}", changes.root.display());
            for path in &changes.changed {
                println!("  M {}", path);
            }
            for path in &changes.deleted {
                println!("  D {}", path);
            }
            println!(
                "  {} changed, {} deleted",
                changes.changed.len(),
                changes.deleted.len()
            );
        }
        Commands::Search { query, k } => {
            retrieve::run_search(&cfg, &query, k).await?;
        }
        Commands::Plan { query, k, json } => {
            plan::run_plan(&cfg, &query, k, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
    }

    Ok(())
}
