//! File discovery and categorization.
//!
//! [`Discoverer`] walks a project tree, pruning well-known build, cache,
//! and dependency directories, and keeps files whose extension was
//! requested. [`categorize_files`] then maps each file onto exactly one
//! [`Category`] through a static extension table.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::error::PipelineError;
use crate::models::Category;

/// Directory names never descended into.
pub const IGNORE_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "env",
    "build",
    "dist",
    "target",
    ".pytest_cache",
    ".mypy_cache",
    "coverage",
    ".idea",
    ".vscode",
    "chroma_db",
    "rule_index",
];

pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "java", "js", "ts", "jsx", "tsx", "cs", "cpp", "c", "go", "rb", "php", "rs", "kt",
];
pub const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc"];
pub const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "xml"];

/// Extensions (without the dot) that belong to a category.
pub fn extensions_of(category: Category) -> &'static [&'static str] {
    match category {
        Category::Code => CODE_EXTENSIONS,
        Category::Doc => DOC_EXTENSIONS,
        Category::Config => CONFIG_EXTENSIONS,
    }
}

/// All extensions belonging to any of `categories`.
pub fn extensions_for(categories: &[Category]) -> Vec<&'static str> {
    categories
        .iter()
        .flat_map(|c| extensions_of(*c).iter().copied())
        .collect()
}

/// Lowercased extension of `path`, without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Category for a path, or `None` if no table entry matches.
pub fn category_for(path: &Path) -> Option<Category> {
    let ext = extension_of(path)?;
    Category::ALL
        .into_iter()
        .find(|c| extensions_of(*c).contains(&ext.as_str()))
}

/// Walks a project tree and returns the files matching a set of extensions.
pub struct Discoverer {
    extensions: HashSet<String>,
    ignore_dirs: HashSet<String>,
    exclude: GlobSet,
}

impl Discoverer {
    pub fn new(extensions: &[&str], extra_ignore_dirs: &[String], exclude_globs: &[String]) -> Result<Self> {
        let mut ignore_dirs: HashSet<String> = IGNORE_DIRS.iter().map(|d| d.to_string()).collect();
        ignore_dirs.extend(extra_ignore_dirs.iter().cloned());

        Ok(Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignore_dirs,
            exclude: build_globset(exclude_globs)?,
        })
    }

    /// Build a discoverer for the categories enabled in `config`.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        Self::new(
            &extensions_for(&config.categories()),
            &config.extra_ignore_dirs,
            &config.exclude_globs,
        )
    }

    /// Recursively enumerate `root`, returning absolute paths sorted for
    /// deterministic processing order.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.exists() {
            return Err(PipelineError::PathNotFound {
                path: root.to_path_buf(),
            }
            .into());
        }
        let root = root.canonicalize()?;

        let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !self
                    .ignore_dirs
                    .contains(entry.file_name().to_string_lossy().as_ref())
        });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if self.accepts(path, &root) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Whether `path` is a file [`discover`](Self::discover) would return
    /// for `root`: inside the root, not under an ignored directory, with a
    /// requested extension, and not matched by an exclude glob. Only the
    /// path is inspected, so deleted files can be checked too.
    pub fn accepts(&self, path: &Path, root: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        let under_ignored_dir = relative
            .parent()
            .into_iter()
            .flat_map(|dir| dir.components())
            .any(|component| match component {
                Component::Normal(name) => self.ignore_dirs.contains(name.to_string_lossy().as_ref()),
                // `..` escapes the root.
                _ => true,
            });
        if under_ignored_dir {
            return false;
        }

        let matches = extension_of(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false);
        matches && !self.exclude.is_match(relative)
    }
}

/// Discovered files grouped by category, each list in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedFiles {
    pub code: Vec<PathBuf>,
    pub doc: Vec<PathBuf>,
    pub config: Vec<PathBuf>,
}

impl CategorizedFiles {
    pub fn get(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::Code => &self.code,
            Category::Doc => &self.doc,
            Category::Config => &self.config,
        }
    }

    pub fn len(&self) -> usize {
        self.code.len() + self.doc.len() + self.config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify files by extension. Files matching no table entry are dropped.
pub fn categorize_files(files: &[PathBuf]) -> CategorizedFiles {
    let mut out = CategorizedFiles::default();
    for path in files {
        match category_for(path) {
            Some(Category::Code) => out.code.push(path.clone()),
            Some(Category::Doc) => out.doc.push(path.clone()),
            Some(Category::Config) => out.config.push(path.clone()),
            None => {}
        }
    }
    out
}

/// Path relative to `root`, with forward slashes.
pub fn source_label(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        let root = root.canonicalize().unwrap();
        files.iter().map(|p| source_label(p, &root)).collect()
    }

    #[test]
    fn discovers_matching_extensions_and_prunes_ignored_dirs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "src/orders.py");
        touch(tmp.path(), "docs/shipping.md");
        touch(tmp.path(), "logo.png");
        touch(tmp.path(), "node_modules/pkg/index.js");
        touch(tmp.path(), ".git/HEAD.md");
        touch(tmp.path(), "target/debug/out.rs");

        let discoverer = Discoverer::new(&["py", "md", "js", "rs"], &[], &[]).unwrap();
        let files = discoverer.discover(tmp.path()).unwrap();
        assert_eq!(
            names(&files, tmp.path()),
            vec!["docs/shipping.md", "src/orders.py"]
        );
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn extra_ignore_dirs_and_exclude_globs_apply() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "vendor/lib.py");
        touch(tmp.path(), "app/main.py");
        touch(tmp.path(), "app/main_test.py");

        let discoverer = Discoverer::new(
            &["py"],
            &["vendor".to_string()],
            &["**/*_test.py".to_string()],
        )
        .unwrap();
        let files = discoverer.discover(tmp.path()).unwrap();
        assert_eq!(names(&files, tmp.path()), vec!["app/main.py"]);
    }

    #[test]
    fn accepts_applies_discovery_filters_to_bare_paths() {
        let root = Path::new("/repo");
        let discoverer = Discoverer::new(
            &["py", "js"],
            &["vendor".to_string()],
            &["**/*_test.py".to_string()],
        )
        .unwrap();

        assert!(discoverer.accepts(&root.join("src/orders.py"), root));
        assert!(discoverer.accepts(&root.join("gone/never_existed.py"), root));
        assert!(!discoverer.accepts(&root.join("node_modules/pkg/index.js"), root));
        assert!(!discoverer.accepts(&root.join("a/target/gen.py"), root));
        assert!(!discoverer.accepts(&root.join("vendor/lib.py"), root));
        assert!(!discoverer.accepts(&root.join("src/orders_test.py"), root));
        assert!(!discoverer.accepts(&root.join("logo.png"), root));
        assert!(!discoverer.accepts(&root.join("../outside.py"), root));
        assert!(!discoverer.accepts(Path::new("/elsewhere/a.py"), root));
        // A root named like an ignored directory is still walked.
        assert!(discoverer.accepts(Path::new("/build/a.py"), Path::new("/build")));
    }

    #[test]
    fn missing_root_is_path_not_found() {
        let discoverer = Discoverer::new(&["py"], &[], &[]).unwrap();
        let err = discoverer
            .discover(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::PathNotFound { .. })
        ));
    }

    #[test]
    fn categorize_preserves_order_and_drops_unknown() {
        let files: Vec<PathBuf> = ["b.py", "a.md", "c.yaml", "d.png", "a.py", "README.TXT"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let cats = categorize_files(&files);
        assert_eq!(cats.code, vec![PathBuf::from("b.py"), PathBuf::from("a.py")]);
        assert_eq!(cats.doc, vec![PathBuf::from("a.md"), PathBuf::from("README.TXT")]);
        assert_eq!(cats.config, vec![PathBuf::from("c.yaml")]);
        assert_eq!(cats.len(), 5);
    }

    #[test]
    fn every_extension_maps_to_exactly_one_category() {
        for c in Category::ALL {
            for ext in extensions_of(c) {
                let path = PathBuf::from(format!("file.{}", ext));
                assert_eq!(category_for(&path), Some(c), "extension {}", ext);
            }
        }
    }

    #[test]
    fn source_label_uses_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(source_label(Path::new("/repo/src/a.py"), root), "src/a.py");
        assert_eq!(source_label(Path::new("other/b.md"), root), "other/b.md");
    }
}
