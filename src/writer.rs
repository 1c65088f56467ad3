//! Destination writer.
//!
//! Writes a finished [`FileTree`] to disk: each key becomes a path under the
//! destination directory. Only ever called with the tree of a successful
//! build, so a failed build leaves the destination as it was.

use crate::tree::FileTree;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error writing {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Output key escapes the destination: {0}")]
    UnsafeKey(String),
    #[error("Refusing to write to {destination}: it contains {protected}")]
    UnsafeDestination {
        destination: PathBuf,
        protected: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Refuse a destination that is, or is an ancestor of, any `protected` path
/// (the source directory, the config file).
///
/// Paths are compared after resolving `.`, `..` and symlinks, so `../site`
/// or `site/.` are caught the same as `site`. A destination that does not
/// exist yet resolves through its nearest existing ancestor.
pub fn check_destination(destination: &Path, protected: &[&Path]) -> Result<(), WriteError> {
    let resolved = resolve_path(destination)?;
    for path in protected {
        if resolve_path(path)?.starts_with(&resolved) {
            return Err(WriteError::UnsafeDestination {
                destination: destination.to_path_buf(),
                protected: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn resolve_path(path: &Path) -> Result<PathBuf, WriteError> {
    let io_err = |source: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let absolute = std::path::absolute(path).map_err(io_err)?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing).map_err(io_err)?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Write every file to `destination/<key>`. With `clean`, the destination is
/// removed first so stale outputs from earlier builds disappear. Callers run
/// [`check_destination`] first so a clean never reaches the site's sources.
pub fn write(tree: &FileTree, destination: &Path, clean: bool) -> Result<WriteSummary, WriteError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| WriteError::Io { path, source }
    };

    // Reject every key before touching the disk.
    for key in tree.keys() {
        if !is_safe_key(key) {
            return Err(WriteError::UnsafeKey(key.to_string()));
        }
    }

    if clean && destination.exists() {
        debug!(path = %destination.display(), "cleaning destination");
        fs::remove_dir_all(destination).map_err(io_err(destination))?;
    }
    fs::create_dir_all(destination).map_err(io_err(destination))?;

    let mut summary = WriteSummary::default();
    for (key, file) in tree.iter() {
        let path = destination.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        fs::write(&path, &file.contents).map_err(io_err(&path))?;
        summary.files += 1;
        summary.bytes += file.contents.len() as u64;
    }

    info!(
        files = summary.files,
        bytes = summary.bytes,
        path = %destination.display(),
        "wrote output"
    );
    Ok(summary)
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
