//! CLI output formatting for builds.
//!
//! # Information-First Display
//!
//! Every output file is listed by its output path, the thing a reader will
//! look for in the destination directory. Where the file came from and what
//! shaped it (source path, title, layout, excerpt) follow as indented context
//! lines, shown only when they add information.
//!
//! # Output Format
//!
//! ## Build / Check
//!
//! ```text
//! Files
//! 001 about.html
//!     Source: about.md
//!     Title: About
//! 002 blog/2015/Jun/hello-world/index.html
//!     Source: posts/hello-world.md
//!     Title: Hello World
//!     Layout: post.html
//!     Excerpt: Welcome to the new blog...
//! 003 css/site.css
//!
//! Collections
//! posts (2 files)
//!     001 Hello World → blog/2015/Jun/hello-world/index.html
//!     002 First Post → blog/2014/Jan/first-post/index.html
//!
//! Built 3 files, 1 collection
//! ```
//!
//! ## Write
//!
//! ```text
//! Wrote 3 files (4.2 KB) → build
//! ```
//!
//! # Architecture
//!
//! Each result has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::Build;
use crate::tree::{File, FileTree};
use crate::value::Value;
use crate::writer::WriteSummary;
use std::path::Path;

const EXCERPT_WIDTH: usize = 60;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}

fn title_of(file: &File) -> Option<&str> {
    file.metadata
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

// ============================================================================
// Build output
// ============================================================================

fn file_lines(pos: usize, key: &str, file: &File) -> Vec<String> {
    let mut lines = vec![format!("{} {}", format_index(pos), key)];
    if file.id() != key {
        lines.push(format!("{}Source: {}", indent(1), file.id()));
    }
    if let Some(title) = title_of(file) {
        lines.push(format!("{}Title: {}", indent(1), title));
    }
    if let Some(layout) = file.metadata.get("layout").and_then(Value::as_str) {
        lines.push(format!("{}Layout: {}", indent(1), layout));
    }
    if let Some(excerpt) = file.metadata.get("excerpt").and_then(Value::as_str) {
        let text = strip_html_tags(excerpt);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            lines.push(format!(
                "{}Excerpt: {}",
                indent(1),
                truncate(&text, EXCERPT_WIDTH)
            ));
        }
    }
    lines
}

fn collection_lines(name: &str, ids: &[String], tree: &FileTree) -> Vec<String> {
    let mut lines = vec![format!("{name} ({})", plural(ids.len(), "file", "files"))];
    for (i, id) in ids.iter().enumerate() {
        let line = match tree.find_by_id(id) {
            Some((key, file)) => match title_of(file) {
                Some(title) => format!("{} {} → {}", format_index(i + 1), title, key),
                None => format!("{} {}", format_index(i + 1), key),
            },
            None => format!("{} ({})", format_index(i + 1), id),
        };
        lines.push(format!("{}{}", indent(1), line));
    }
    lines
}

/// Format the final tree and collections of a build.
pub fn format_build_output(build: &Build) -> Vec<String> {
    let mut lines = Vec::new();

    if !build.tree.is_empty() {
        lines.push("Files".to_string());
        for (i, (key, file)) in build.tree.iter().enumerate() {
            lines.extend(file_lines(i + 1, key, file));
        }
    }

    let collections = build.context.collections();
    if !collections.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Collections".to_string());
        for (name, ids) in collections {
            lines.extend(collection_lines(name, ids, &build.tree));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Built {}, {}",
        plural(build.tree.len(), "file", "files"),
        plural(collections.len(), "collection", "collections")
    ));
    lines
}

pub fn print_build_output(build: &Build) {
    for line in format_build_output(build) {
        println!("{}", line);
    }
}

/// Format the writer's summary line.
pub fn format_write_summary(summary: &WriteSummary, destination: &Path) -> Vec<String> {
    vec![format!(
        "Wrote {} ({}) → {}",
        plural(summary.files, "file", "files"),
        human_bytes(summary.bytes),
        destination.display()
    )]
}

pub fn print_write_summary(summary: &WriteSummary, destination: &Path) {
    for line in format_write_summary(summary, destination) {
        println!("{}", line);
    }
}

/// The final tree as JSON: output paths with their source id and metadata,
/// plus the collections.
pub fn build_json(build: &Build) -> serde_json::Value {
    let files: Vec<serde_json::Value> = build
        .tree
        .iter()
        .map(|(key, file)| {
            serde_json::json!({
                "key": key,
                "id": file.id(),
                "metadata": file.metadata,
            })
        })
        .collect();
    serde_json::json!({
        "files": files,
        "collections": build.context.collections(),
    })
}
