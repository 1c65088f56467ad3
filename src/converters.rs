//! Content converters: Markdown → HTML and excerpt extraction.
//!
//! Both are ordinary stages. [`Markdown`] renames `page.md` to `page.html`
//! through the tree's two-phase rename, so a clash with an existing
//! `page.html` fails the build instead of overwriting it.

use crate::error::BuildError;
use crate::tree::{FileTree, Rename, is_html};
use crate::value::Value;
use pulldown_cmark::{Options, Parser, html};
use rayon::prelude::*;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Metadata key receiving a page's excerpt.
pub const EXCERPT_KEY: &str = "excerpt";

const MARKDOWN_EXTENSIONS: [&str; 2] = [".md", ".markdown"];

#[derive(Debug, Clone, Default)]
pub struct Markdown;

impl Markdown {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, tree: &mut FileTree) -> Result<(), BuildError> {
        let jobs: Vec<(String, String, String)> = tree
            .iter()
            .filter_map(|(key, file)| {
                html_key(key).map(|target| (key.clone(), target, file.text().into_owned()))
            })
            .collect();

        let rendered: Vec<(String, String)> = jobs
            .par_iter()
            .map(|(_, target, text)| (target.clone(), render_markdown(text)))
            .collect();

        let renames = jobs
            .into_iter()
            .map(|(key, target, _)| Rename::new(key, target))
            .collect();
        debug!(files = rendered.len(), "converted markdown");

        tree.apply_renames(renames)?;
        for (key, html) in rendered {
            if let Some(file) = tree.get_mut(&key) {
                file.contents = html.into_bytes();
            }
        }
        Ok(())
    }
}

/// `posts/a.md` → `posts/a.html`; `None` for non-markdown keys.
fn html_key(key: &str) -> Option<String> {
    MARKDOWN_EXTENSIONS
        .iter()
        .find_map(|ext| key.strip_suffix(ext))
        .filter(|stem| !stem.is_empty() && !stem.ends_with('/'))
        .map(|stem| format!("{stem}.html"))
}

pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

static FIRST_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p(?:\s[^>]*)?>.*?</p>").unwrap());

/// Stores the first `<p>` element of each HTML file as `excerpt`, unless the
/// file already has one.
#[derive(Debug, Clone, Default)]
pub struct Excerpts;

impl Excerpts {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, tree: &mut FileTree) -> Result<(), BuildError> {
        for (key, file) in tree.iter_mut() {
            if !is_html(key) || file.metadata.get(EXCERPT_KEY).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let excerpt = FIRST_PARAGRAPH
                .find(&file.text())
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            file.metadata
                .insert(EXCERPT_KEY.to_string(), Value::String(excerpt));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{file, file_with, keys, text_at, tree_of};

    #[test]
    fn markdown_becomes_html_under_new_key() {
        let mut tree = tree_of(vec![
            file("posts/a.md", "# Title\n\nBody *text*."),
            file("notes.markdown", "plain"),
            file("style.css", "body{}"),
        ]);
        Markdown::new().run(&mut tree).unwrap();

        assert_eq!(keys(&tree), vec!["notes.html", "posts/a.html", "style.css"]);
        assert_eq!(
            text_at(&tree, "posts/a.html"),
            "<h1>Title</h1>\n<p>Body <em>text</em>.</p>\n"
        );
        assert_eq!(tree.get("posts/a.html").unwrap().id(), "posts/a.md");
        assert_eq!(text_at(&tree, "style.css"), "body{}");
    }

    #[test]
    fn markdown_extensions_are_enabled() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn markdown_keeps_metadata() {
        let mut tree = tree_of(vec![file_with("a.md", "x", &[("title", "A".into())])]);
        Markdown::new().run(&mut tree).unwrap();
        assert_eq!(tree.get("a.html").unwrap().metadata["title"], Value::from("A"));
    }

    #[test]
    fn markdown_refuses_to_overwrite_existing_html() {
        let mut tree = tree_of(vec![file("a.md", "new"), file("a.html", "old")]);
        let err = Markdown::new().run(&mut tree).unwrap_err();
        assert!(matches!(err, BuildError::PermalinkCollision { .. }));
        assert_eq!(text_at(&tree, "a.md"), "new");
        assert_eq!(text_at(&tree, "a.html"), "old");
    }

    #[test]
    fn html_key_needs_a_stem() {
        assert_eq!(html_key("a.md").as_deref(), Some("a.html"));
        assert_eq!(html_key("dir/.md"), None);
        assert_eq!(html_key("a.mdx"), None);
    }

    #[test]
    fn excerpt_is_first_paragraph() {
        let mut tree = tree_of(vec![file(
            "a.html",
            "<h1>T</h1>\n<pre>code</pre>\n<p class=\"lead\">One\ntwo</p>\n<p>Three</p>",
        )]);
        Excerpts::new().run(&mut tree).unwrap();
        assert_eq!(
            tree.get("a.html").unwrap().metadata[EXCERPT_KEY],
            Value::from("<p class=\"lead\">One\ntwo</p>")
        );
    }

    #[test]
    fn existing_excerpt_is_kept_and_missing_paragraph_is_empty() {
        let mut tree = tree_of(vec![
            file_with("a.html", "<p>x</p>", &[("excerpt", "custom".into())]),
            file("b.html", "<h1>no paragraphs</h1>"),
            file("c.css", "<p>not html</p>"),
            file("d.htm", "<p>legacy</p>"),
        ]);
        Excerpts::new().run(&mut tree).unwrap();
        assert_eq!(tree.get("a.html").unwrap().metadata[EXCERPT_KEY], Value::from("custom"));
        assert_eq!(tree.get("b.html").unwrap().metadata[EXCERPT_KEY], Value::from(""));
        assert!(!tree.get("c.css").unwrap().metadata.contains_key(EXCERPT_KEY));
        assert_eq!(
            tree.get("d.htm").unwrap().metadata[EXCERPT_KEY],
            Value::from("<p>legacy</p>")
        );
    }
}
