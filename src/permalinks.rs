//! Output paths from metadata templates.
//!
//! A permalink pattern such as `blog/:publishDate/:title` is filled in from
//! each file's own metadata and the file moves to `<permalink>/index.html`,
//! so the page is served from a clean directory URL. The permalink itself is
//! stored in the file's `path` metadata for templates.
//!
//! ## Token Values
//!
//! - Dates are formatted with the stage's [`DateFormat`].
//! - Other scalars are string-coerced and, unless disabled, slugified:
//!   `Hello, World!` → `hello-world`.
//! - A missing, empty, or non-scalar value fails the build.
//!
//! ## Scope
//!
//! Only HTML files are moved. A file opts out with `permalink: false`.
//!
//! ## Relative vs. Flat
//!
//! | `relative` | `posts/2015/hello.html` with `:title` |
//! |------------|---------------------------------------|
//! | `false` | `hello-world/index.html` |
//! | `true` | `posts/2015/hello-world/index.html` |
//!
//! A pattern with no tokens is valid and sends every file in scope to one
//! place; two files landing on the same path is a collision error.

use crate::config::ConfigError;
use crate::error::BuildError;
use crate::tree::{File, FileTree, Rename, is_html};
use crate::value::Value;
use chrono::{Datelike, NaiveDateTime};
use tracing::debug;

/// Metadata key receiving the computed permalink.
pub const PATH_KEY: &str = "path";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token(String),
}

#[derive(Debug, Clone)]
pub struct Permalinks {
    pattern: String,
    segments: Vec<Segment>,
    date_format: DateFormat,
    relative: bool,
    slug: bool,
}

impl Permalinks {
    pub fn new(pattern: &str, date_format: &str, relative: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: pattern.to_string(),
            segments: parse_pattern(pattern),
            date_format: DateFormat::parse(date_format)?,
            relative,
            slug: true,
        })
    }

    /// Toggle slugification of non-date token values.
    #[must_use]
    pub fn slug(mut self, slug: bool) -> Self {
        self.slug = slug;
        self
    }

    /// Compute the permalink for the file at `key`. With `relative`, the
    /// permalink is prefixed with the directory the file was loaded from.
    pub fn resolve(&self, key: &str, file: &File) -> Result<String, BuildError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(name) => out.push_str(&self.token_value(key, file, name)?),
            }
        }

        let mut parts: Vec<&str> = Vec::new();
        if self.relative
            && let Some((dir, _)) = file.id().rsplit_once('/')
        {
            parts.extend(dir.split('/'));
        }
        parts.extend(out.split('/'));
        Ok(parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/"))
    }

    fn token_value(&self, key: &str, file: &File, name: &str) -> Result<String, BuildError> {
        let missing = |why: &str| {
            BuildError::stage(
                "permalinks",
                format!(
                    "{key}: token `:{name}` in `{}` {why}",
                    self.pattern
                ),
            )
        };
        let value = file
            .metadata
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| missing("has no metadata value"))?;

        let text = match value {
            Value::Date(d) => self.date_format.format(d),
            other => {
                let raw = other
                    .to_scalar_string()
                    .ok_or_else(|| missing(&format!("is a {}, not a scalar", other.type_name())))?;
                if self.slug { slugify(&raw) } else { raw }
            }
        };
        if text.is_empty() {
            return Err(missing("resolves to an empty string"));
        }
        Ok(text)
    }

    pub fn run(&self, tree: &mut FileTree) -> Result<(), BuildError> {
        let mut renames = Vec::new();
        let mut links = Vec::new();

        for (key, file) in tree.iter() {
            if !is_html(key) || file.metadata.get("permalink").and_then(Value::as_bool) == Some(false)
            {
                continue;
            }
            let permalink = self.resolve(key, file)?;
            let target = if permalink.is_empty() {
                "index.html".to_string()
            } else {
                format!("{permalink}/index.html")
            };
            debug!(from = %key, to = %target, "permalink");
            links.push((target.clone(), permalink));
            renames.push(Rename::new(key.clone(), target));
        }

        tree.apply_renames(renames)?;
        for (target, permalink) in links {
            if let Some(file) = tree.get_mut(&target) {
                file.metadata
                    .insert(PATH_KEY.to_string(), Value::String(permalink));
            }
        }
        Ok(())
    }
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        let starts_token = c == ':'
            && chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_');
        if !starts_token {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }
        segments.push(Segment::Token(name));
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Lowercase ASCII slug: transliterate, then collapse every run of
/// non-alphanumerics into one `-`.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// ============================================================================
// Date formatting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum DatePart {
    Year,
    ShortYear,
    MonthName,
    MonthAbbr,
    PaddedMonth,
    Month,
    PaddedDay,
    Day,
}

#[derive(Debug, Clone, PartialEq)]
enum DateItem {
    Part(DatePart),
    Literal(String),
}

/// A date layout built from `YYYY`, `YY`, `MMMM`, `MMM`, `MM`, `M`, `DD` and
/// `D`. Everything that is not a letter is copied literally.
///
/// `YYYY/MMM` formats 2015-06-14 as `2015/Jun`.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFormat {
    items: Vec<DateItem>,
}

impl DateFormat {
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        let chars: Vec<char> = format.chars().collect();
        let mut items = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if !c.is_alphabetic() {
                match items.last_mut() {
                    Some(DateItem::Literal(text)) => text.push(c),
                    _ => items.push(DateItem::Literal(c.to_string())),
                }
                i += 1;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&n| n == c).count();
            let part = match (c, run) {
                ('Y', 4) => DatePart::Year,
                ('Y', 2) => DatePart::ShortYear,
                ('M', 4) => DatePart::MonthName,
                ('M', 3) => DatePart::MonthAbbr,
                ('M', 2) => DatePart::PaddedMonth,
                ('M', 1) => DatePart::Month,
                ('D', 2) => DatePart::PaddedDay,
                ('D', 1) => DatePart::Day,
                _ => {
                    let token: String = chars[i..i + run].iter().collect();
                    return Err(ConfigError::Validation(format!(
                        "unrecognized date format token `{token}` in `{format}`"
                    )));
                }
            };
            items.push(DateItem::Part(part));
            i += run;
        }

        Ok(Self { items })
    }

    pub fn format(&self, date: &NaiveDateTime) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                DateItem::Literal(text) => out.push_str(text),
                DateItem::Part(part) => {
                    let piece = match part {
                        DatePart::Year => format!("{:04}", date.year()),
                        DatePart::ShortYear => format!("{:02}", date.year().rem_euclid(100)),
                        DatePart::MonthName => date.format("%B").to_string(),
                        DatePart::MonthAbbr => date.format("%b").to_string(),
                        DatePart::PaddedMonth => format!("{:02}", date.month()),
                        DatePart::Month => date.month().to_string(),
                        DatePart::PaddedDay => format!("{:02}", date.day()),
                        DatePart::Day => date.day().to_string(),
                    };
                    out.push_str(&piece);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{date, file, file_with, keys, tree_of};

    fn blog() -> Permalinks {
        Permalinks::new("blog/:publishDate/:title", "YYYY/MMM", false).unwrap()
    }

    fn hello(id: &str) -> File {
        file_with(
            id,
            "<p>hi</p>",
            &[
                ("publishDate", date(2015, 6, 14)),
                ("title", Value::from("hello-world")),
            ],
        )
    }

    #[test]
    fn month_granularity_permalink() {
        let link = blog().resolve("posts/hello.html", &hello("posts/hello.html")).unwrap();
        assert_eq!(link, "blog/2015/Jun/hello-world");
    }

    #[test]
    fn run_moves_file_and_records_path() {
        let mut tree = tree_of(vec![hello("posts/hello.html")]);
        blog().run(&mut tree).unwrap();

        assert_eq!(keys(&tree), vec!["blog/2015/Jun/hello-world/index.html"]);
        let moved = tree.get("blog/2015/Jun/hello-world/index.html").unwrap();
        assert_eq!(moved.metadata[PATH_KEY], Value::from("blog/2015/Jun/hello-world"));
        assert_eq!(moved.id(), "posts/hello.html");
    }

    #[test]
    fn collision_fails_and_leaves_tree_untouched() {
        let mut tree = tree_of(vec![hello("posts/a.html"), hello("posts/b.html")]);
        let before = tree.clone();
        let err = blog().run(&mut tree).unwrap_err();
        match err {
            BuildError::PermalinkCollision { path, .. } => {
                assert_eq!(path, "blog/2015/Jun/hello-world/index.html")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tree, before);
    }

    #[test]
    fn relative_keeps_source_directory() {
        let links = Permalinks::new(":title", "YYYY", true).unwrap();
        let link = links
            .resolve("posts/2015/hello.html", &hello("posts/2015/hello.html"))
            .unwrap();
        assert_eq!(link, "posts/2015/hello-world");
    }

    #[test]
    fn relative_uses_source_directory_after_a_rename() {
        let links = Permalinks::new(":title", "YYYY", true).unwrap();
        let link = links
            .resolve("blog/hello-world/index.html", &hello("posts/2015/hello.md"))
            .unwrap();
        assert_eq!(link, "posts/2015/hello-world");
    }

    #[test]
    fn flat_ignores_source_directory() {
        let links = Permalinks::new(":title", "YYYY", false).unwrap();
        let link = links
            .resolve("posts/2015/hello.html", &hello("posts/2015/hello.html"))
            .unwrap();
        assert_eq!(link, "hello-world");
    }

    #[test]
    fn constant_pattern_flattens_to_one_place() {
        let mut tree = tree_of(vec![file("index.html", "home")]);
        Permalinks::new("", "YYYY", false)
            .unwrap()
            .run(&mut tree)
            .unwrap();
        assert_eq!(keys(&tree), vec!["index.html"]);
        assert_eq!(tree.get("index.html").unwrap().metadata[PATH_KEY], Value::from(""));

        let mut tree = tree_of(vec![file("welcome.html", "home")]);
        Permalinks::new("home", "YYYY", false)
            .unwrap()
            .run(&mut tree)
            .unwrap();
        assert_eq!(keys(&tree), vec!["home/index.html"]);
    }

    #[test]
    fn titles_are_slugified() {
        let f = file_with("a.html", "", &[("title", Value::from("Ça va, Monde?"))]);
        let links = Permalinks::new(":title", "YYYY", false).unwrap();
        assert_eq!(links.resolve("a.html", &f).unwrap(), "ca-va-monde");
        let raw = links.slug(false);
        assert_eq!(raw.resolve("a.html", &f).unwrap(), "Ça va, Monde?");
    }

    #[test]
    fn missing_token_value_is_stage_error() {
        let err = blog()
            .resolve("a.html", &file_with("a.html", "", &[("title", "x".into())]))
            .unwrap_err();
        assert!(matches!(err, BuildError::Stage { .. }));
        assert!(err.to_string().contains(":publishDate"));
    }

    #[test]
    fn title_slugifying_to_nothing_is_stage_error() {
        let f = file_with("a.html", "", &[("title", "!!!".into())]);
        let err = Permalinks::new(":title", "YYYY", false)
            .unwrap()
            .resolve("a.html", &f)
            .unwrap_err();
        assert!(matches!(err, BuildError::Stage { .. }));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn list_token_value_is_stage_error() {
        let f = file_with(
            "a.html",
            "",
            &[("title", Value::List(vec!["a".into(), "b".into()]))],
        );
        let mut tree = tree_of(vec![f]);
        let before = tree.clone();
        let err = Permalinks::new(":title", "YYYY", false)
            .unwrap()
            .run(&mut tree)
            .unwrap_err();
        assert!(matches!(err, BuildError::Stage { .. }));
        assert!(err.to_string().contains("not a scalar"));
        assert_eq!(tree, before);
    }

    #[test]
    fn non_html_and_opted_out_files_stay() {
        let mut tree = tree_of(vec![
            file_with("style.css", "", &[("title", "x".into())]),
            file_with(
                "keep.html",
                "",
                &[("title", "x".into()), ("permalink", Value::Bool(false))],
            ),
        ]);
        Permalinks::new(":title", "YYYY", false)
            .unwrap()
            .run(&mut tree)
            .unwrap();
        assert_eq!(keys(&tree), vec!["keep.html", "style.css"]);
    }

    #[test]
    fn date_format_granularities() {
        let d = date(2015, 6, 4).as_date().unwrap();
        let fmt = |f: &str| DateFormat::parse(f).unwrap().format(&d);
        assert_eq!(fmt("YYYY"), "2015");
        assert_eq!(fmt("YYYY/MM"), "2015/06");
        assert_eq!(fmt("YYYY/MM/DD"), "2015/06/04");
        assert_eq!(fmt("YY-M-D"), "15-6-4");
        assert_eq!(fmt("MMMM YYYY"), "June 2015");
        assert_eq!(fmt("YYYY/MMM"), "2015/Jun");
    }

    #[test]
    fn unknown_date_tokens_are_config_errors() {
        assert!(DateFormat::parse("YYYY/Q").is_err());
        assert!(DateFormat::parse("YYY").is_err());
        assert!(DateFormat::parse("MMMMM").is_err());
        assert!(Permalinks::new(":date", "hh:mm", false).is_err());
    }

    #[test]
    fn colons_without_names_are_literal() {
        assert_eq!(
            parse_pattern("a:/:b"),
            vec![
                Segment::Literal("a:/".to_string()),
                Segment::Token("b".to_string())
            ]
        );
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Hello -- World  "), "hello-world");
        assert_eq!(slugify("hello-world"), "hello-world");
        assert_eq!(slugify("2015"), "2015");
    }
}
