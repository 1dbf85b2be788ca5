use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file inside an index directory.
pub const INDEX_DB_FILE: &str = "index.sqlite";

pub fn db_path(index_dir: &Path) -> PathBuf {
    index_dir.join(INDEX_DB_FILE)
}

/// Open the index database under `index_dir`, creating the directory and
/// file when `create` is set.
pub async fn connect(index_dir: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        std::fs::create_dir_all(index_dir)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path(index_dir).display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // A single connection keeps reads ordered after writes on one handle.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
