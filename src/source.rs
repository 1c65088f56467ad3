//! Source tree loading.
//!
//! Walks the source directory into the initial [`FileTree`]. Every regular
//! file becomes one entry keyed by its `/`-separated path relative to the
//! root. Hidden entries (leading `.`) are skipped, as is anything matching
//! the configured ignore patterns.
//!
//! ## Frontmatter
//!
//! A text file whose first line is `---` carries YAML frontmatter up to the
//! next `---` line:
//!
//! ```text
//! ---
//! title: Hello World
//! publishDate: 2015-06-14
//! ---
//! Body starts here.
//! ```
//!
//! The block must be a YAML mapping; it becomes the file's metadata and is
//! stripped from the contents. Date-shaped strings become dates.

use crate::pattern::{PatternError, PatternSet};
use crate::tree::{File, FileTree};
use crate::value::{Metadata, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source directory not found: {0}")]
    MissingRoot(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid frontmatter in {path}: {source}")]
    Frontmatter {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("Frontmatter in {0} is not a mapping")]
    NotAMapping(String),
    #[error("Duplicate source key: {0}")]
    Duplicate(String),
    #[error("Invalid ignore pattern: {0}")]
    Pattern(#[from] PatternError),
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Files whose keys match are left out of the tree.
    pub ignore: Option<PatternSet>,
}

impl LoadOptions {
    pub fn ignoring<I, S>(globs: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let globs: Vec<S> = globs.into_iter().collect();
        if globs.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            ignore: Some(PatternSet::new(globs)?),
        })
    }

    fn is_ignored(&self, key: &str) -> bool {
        self.ignore.as_ref().is_some_and(|set| set.is_match(key))
    }
}

/// Load every file under `root` into a fresh tree.
pub fn load(root: &Path, options: &LoadOptions) -> Result<FileTree, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::MissingRoot(root.to_path_buf()));
    }

    let mut tree = FileTree::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = relative_key(root, entry.path());
        if options.is_ignored(&key) {
            debug!(path = %key, "ignored");
            continue;
        }

        let bytes = fs::read(entry.path()).map_err(|source| LoadError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        let file = parse_file(&key, bytes)?;
        if tree.insert(key.clone(), file).is_err() {
            return Err(LoadError::Duplicate(key));
        }
    }

    info!(root = %root.display(), files = tree.len(), "loaded source tree");
    Ok(tree)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build a [`File`] from raw bytes, splitting off frontmatter when present.
pub fn parse_file(key: &str, bytes: Vec<u8>) -> Result<File, LoadError> {
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok(File::new(key, bytes));
    };
    let Some((yaml, body)) = split_frontmatter(text) else {
        return Ok(File::new(key, bytes));
    };

    let metadata = parse_frontmatter(key, yaml)?;
    Ok(File::new(key, body).with_metadata(metadata))
}

fn parse_frontmatter(key: &str, yaml: &str) -> Result<Metadata, LoadError> {
    let raw: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|source| LoadError::Frontmatter {
            path: key.to_string(),
            source,
        })?;
    match Value::from(raw) {
        Value::Map(metadata) => Ok(metadata),
        Value::Null => Ok(Metadata::new()),
        _ => Err(LoadError::NotAMapping(key.to_string())),
    }
}

/// Split `---`-delimited frontmatter from the body.
///
/// Returns `None` when the text does not open with a `---` line or the block
/// is never closed.
pub fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}
