//! Change detection between two git revisions.
//!
//! Runs `git diff --name-status -z <base> <compare>` in the configured
//! repository and splits the result into changed paths (added, modified,
//! type-changed, copy and rename targets) and deleted paths (deletions and
//! rename sources). Both lists are filtered to the extensions the pipeline
//! ingests and keep diff order. Paths are relative to the repository's
//! top-level directory, which is returned as [`ChangeSet::root`].

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Config;
use crate::discover::{extension_of, extensions_for, source_label};
use crate::error::PipelineError;
use crate::models::ChangeSet;

pub struct ChangeDetector {
    repo: PathBuf,
    extensions: Vec<String>,
}

impl ChangeDetector {
    pub fn new(repo: &Path, extensions: &[&str]) -> Self {
        Self {
            repo: repo.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    /// Detector over `[changes] repo` for the categories enabled in `[discovery]`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.changes.repo,
            &extensions_for(&config.discovery.categories()),
        )
    }

    /// Paths that differ between `base` and `compare`.
    pub fn detect(&self, base: &str, compare: &str) -> Result<ChangeSet> {
        let toplevel = run_git(&self.repo, &["rev-parse", "--show-toplevel"])?;
        let root = PathBuf::from(toplevel.trim());

        let output = run_git(
            &self.repo,
            &["diff", "--name-status", "-z", base, compare],
        )?;
        let (changed, deleted) = parse_name_status(&output);
        debug!(
            base,
            compare,
            changed = changed.len(),
            deleted = deleted.len(),
            "git diff parsed"
        );

        let ext: Vec<&str> = self.extensions.iter().map(|e| e.as_str()).collect();
        Ok(ChangeSet {
            root,
            changed: filter_supported(&changed, &ext),
            deleted: filter_supported(&deleted, &ext),
        })
    }
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;

    if !output.status.success() {
        return Err(PipelineError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse NUL-separated `git diff --name-status -z` output into
/// `(changed, deleted)`.
pub fn parse_name_status(output: &str) -> (Vec<String>, Vec<String>) {
    let mut changed = Vec::new();
    let mut deleted = Vec::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());

    while let Some(status) = fields.next() {
        match status.chars().next() {
            Some('R') => {
                if let (Some(old), Some(new)) = (fields.next(), fields.next()) {
                    deleted.push(old.to_string());
                    changed.push(new.to_string());
                }
            }
            Some('C') => {
                if let (Some(_src), Some(dst)) = (fields.next(), fields.next()) {
                    changed.push(dst.to_string());
                }
            }
            Some('D') => {
                if let Some(path) = fields.next() {
                    deleted.push(path.to_string());
                }
            }
            Some(_) => {
                if let Some(path) = fields.next() {
                    changed.push(path.to_string());
                }
            }
            None => {}
        }
    }

    (changed, deleted)
}

/// Keep only paths whose extension is in `extensions`, preserving order.
pub fn filter_supported(paths: &[String], extensions: &[&str]) -> Vec<String> {
    paths
        .iter()
        .filter(|p| {
            extension_of(Path::new(p.as_str()))
                .map(|ext| extensions.contains(&ext.as_str()))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Change set for an explicit file list. Absolute paths under `root` are
/// made relative to it; relative paths are taken as already relative.
pub fn explicit_change_set(root: &Path, files: &[PathBuf], extensions: &[&str]) -> ChangeSet {
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let paths: Vec<String> = files
        .iter()
        .map(|f| {
            if f.is_absolute() {
                let f = f.canonicalize().unwrap_or_else(|_| f.clone());
                source_label(&f, &canonical_root)
            } else {
                source_label(f, Path::new(""))
            }
        })
        .collect();

    ChangeSet {
        root: canonical_root,
        changed: filter_supported(&paths, extensions),
        deleted: Vec::new(),
    }
}
