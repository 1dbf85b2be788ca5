//! Typed pipeline errors.
//!
//! Most of the crate returns `anyhow::Result`; these variants are the
//! conditions a caller may want to match on after downcasting.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Project root does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("No index found at {}. Run `rh bootstrap` first.", path.display())]
    IndexMissing { path: PathBuf },

    #[error(
        "Refusing to replace {}: the directory is not empty and holds no index. Point [index] path at a dedicated directory.",
        path.display()
    )]
    NotAnIndex { path: PathBuf },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
}
