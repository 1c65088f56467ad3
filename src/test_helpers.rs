//! Shared test utilities for the pressroom test suite.
//!
//! Builders for files and trees, key extractors, and fixture setup.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tree = tree_of(vec![
//!     file_with("posts/a.html", "<p>A</p>", &[("title", "A".into())]),
//!     file("about.html", ""),
//! ]);
//! assert_eq!(keys(&tree), vec!["about.html", "posts/a.html"]);
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::tree::{File, FileTree};
use crate::value::{Metadata, Value};

// =========================================================================
// Builders
// =========================================================================

/// A file with no metadata.
pub fn file(id: &str, contents: &str) -> File {
    File::new(id, contents)
}

/// A file with the given metadata entries.
pub fn file_with(id: &str, contents: &str, entries: &[(&str, Value)]) -> File {
    File::new(id, contents).with_metadata(meta(entries))
}

pub fn meta(entries: &[(&str, Value)]) -> Metadata {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A tree with every file stored under its id.
pub fn tree_of(files: Vec<File>) -> FileTree {
    files
        .into_iter()
        .map(|f| (f.id().to_string(), f))
        .collect()
}

pub fn date(y: i32, m: u32, d: u32) -> Value {
    Value::from(chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// =========================================================================
// Extractors
// =========================================================================

/// All keys in tree order.
pub fn keys(tree: &FileTree) -> Vec<&str> {
    tree.keys().collect()
}

/// Contents of the file at `key` as text. Panics if missing.
pub fn text_at(tree: &FileTree, key: &str) -> String {
    tree.get(key)
        .map(|f| f.text().into_owned())
        .unwrap_or_else(|| {
            let available = keys(tree);
            panic!("no file at '{key}'. Available: {available:?}")
        })
}

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
