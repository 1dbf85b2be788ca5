//! # Rule Harness
//!
//! A business-rule knowledge base for test planning.
//!
//! Rule Harness walks a project, turns source code into natural-language
//! business rules through a text-generation service, chunks code rules and
//! documentation into traceable segments, and keeps them in a persistent
//! vector index. Queries retrieve the nearest rules and ask the generation
//! service for a Gherkin test plan grounded in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌──────────────┐
//! │ Discover  │──▶│ Translate │──▶│  Chunk  │──▶│ Index writer │──▶ SQLite
//! │ Categorize│   │ (code)    │   │ + tag   │   │ rebuild/delta│
//! └───────────┘   └───────────┘   └─────────┘   └──────────────┘
//!       ▲                                                │
//!  git changes                          ┌────────────────┘
//!                                       ▼
//!                                 ┌───────────┐   ┌──────────────┐
//!                                 │ Retriever │──▶│ Plan builder │
//!                                 └───────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rh bootstrap                         # full scan, rebuild the index
//! rh delta                             # ingest files changed in HEAD^..HEAD
//! rh search "shipping rules"
//! rh plan "shipping rules for large orders"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`discover`] | File discovery and categorization |
//! | [`generation`] | Text-generation backends |
//! | [`translate`] | Code-to-rule translation |
//! | [`chunk`] | Text chunking and chunk metadata |
//! | [`embedding`] | Embedding backends and vector utilities |
//! | [`store`] | Vector index capability and backends |
//! | [`index`] | Rebuild, append, and upsert writes |
//! | [`changes`] | Git change detection |
//! | [`ingest`] | Bootstrap and delta pipelines |
//! | [`retrieve`] | Nearest-chunk retrieval |
//! | [`plan`] | Test-plan generation |
//! | [`stats`] | Index statistics |
//! | [`export`] | JSON export |

pub mod changes;
pub mod chunk;
pub mod config;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod export;
pub mod generation;
mod http;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod plan;
pub mod progress;
pub mod retrieve;
pub mod stats;
pub mod store;
pub mod translate;
