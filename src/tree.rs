//! The in-memory file tree every stage operates on.
//!
//! A [`FileTree`] maps a path key (forward-slash separated, relative to the
//! source root) to a [`File`]. The key is the file's current output path:
//! it starts out equal to the source path and moves when a stage renames the
//! file (markdown conversion, permalinks).
//!
//! Each file also carries an immutable [`File::id`], the source path it was
//! loaded from. Collections store ids rather than keys, so a file stays in its
//! collections no matter how often it is renamed.
//!
//! ## Invariants
//!
//! - Keys are unique. [`FileTree::insert`] and [`FileTree::merge`] refuse to
//!   overwrite.
//! - Renames are two-phase: [`FileTree::apply_renames`] validates a complete
//!   plan before touching the map, so there is never a moment where a file is
//!   present under both its old and new key, and a failed plan leaves the tree
//!   unchanged.

use crate::error::BuildError;
use crate::pattern::PatternSet;
use crate::value::Metadata;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    id: String,
    pub contents: Vec<u8>,
    pub metadata: Metadata,
}

impl File {
    pub fn new(id: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            contents: contents.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Source path the file was loaded from. Never changes.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Contents as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

/// A single move in a rename plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

impl Rename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileTree {
    files: BTreeMap<String, File>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file under `key`. An occupied key is a collision.
    pub fn insert(&mut self, key: impl Into<String>, file: File) -> Result<(), BuildError> {
        let key = key.into();
        if let Some(existing) = self.files.get(&key) {
            return Err(BuildError::PermalinkCollision {
                path: key,
                first: existing.id.clone(),
                second: file.id,
            });
        }
        self.files.insert(key, file);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&File> {
        self.files.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut File> {
        self.files.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<File> {
        self.files.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    /// Look a file up by its source id. Returns its current key too.
    pub fn find_by_id(&self, id: &str) -> Option<(&str, &File)> {
        self.files
            .iter()
            .find(|(_, f)| f.id == id)
            .map(|(k, f)| (k.as_str(), f))
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &File)> {
        self.files.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut File)> {
        self.files.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Move every file whose key matches `patterns` into a new tree.
    pub fn partition(&mut self, patterns: &PatternSet) -> FileTree {
        let matched: Vec<String> = self
            .files
            .keys()
            .filter(|k| patterns.is_match(k))
            .cloned()
            .collect();
        let mut out = FileTree::new();
        for key in matched {
            if let Some(file) = self.files.remove(&key) {
                out.files.insert(key, file);
            }
        }
        out
    }

    /// Move all of `other` into this tree. Fails without changes if any key
    /// is present in both.
    pub fn merge(&mut self, other: FileTree) -> Result<(), BuildError> {
        if let Some((key, incoming)) = other.files.iter().find(|(k, _)| self.files.contains_key(*k))
        {
            return Err(BuildError::PermalinkCollision {
                path: key.clone(),
                first: self.files[key].id.clone(),
                second: incoming.id.clone(),
            });
        }
        self.files.extend(other.files);
        Ok(())
    }

    /// Apply a rename plan atomically.
    ///
    /// The whole plan is validated first: every source must exist, no two
    /// renames may share a target, and no target may land on a key that is
    /// not itself being moved away. Only then are the files moved.
    pub fn apply_renames(&mut self, renames: Vec<Rename>) -> Result<(), BuildError> {
        let renames: Vec<Rename> = renames.into_iter().filter(|r| r.from != r.to).collect();
        if renames.is_empty() {
            return Ok(());
        }

        self.validate_renames(&renames)?;

        let moved: Vec<(String, File)> = renames
            .into_iter()
            .filter_map(|r| self.files.remove(&r.from).map(|f| (r.to, f)))
            .collect();
        self.files.extend(moved);
        Ok(())
    }

    fn validate_renames(&self, renames: &[Rename]) -> Result<(), BuildError> {
        let sources: BTreeSet<&str> = renames.iter().map(|r| r.from.as_str()).collect();
        let mut targets: BTreeMap<&str, &str> = BTreeMap::new();

        for rename in renames {
            let Some(file) = self.files.get(&rename.from) else {
                return Err(BuildError::stage(
                    "rename",
                    format!("cannot rename missing file {}", rename.from),
                ));
            };
            if let Some(previous) = targets.insert(&rename.to, &rename.from) {
                return Err(BuildError::PermalinkCollision {
                    path: rename.to.clone(),
                    first: self.files[previous].id.clone(),
                    second: file.id.clone(),
                });
            }
            if let Some(occupant) = self.files.get(&rename.to)
                && !sources.contains(rename.to.as_str())
            {
                return Err(BuildError::PermalinkCollision {
                    path: rename.to.clone(),
                    first: occupant.id.clone(),
                    second: file.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Whether `key` names an HTML page, the files that layout, permalink and
/// excerpt stages act on.
pub fn is_html(key: &str) -> bool {
    key.ends_with(".html") || key.ends_with(".htm")
}

impl FromIterator<(String, File)> for FileTree {
    fn from_iter<T: IntoIterator<Item = (String, File)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}
