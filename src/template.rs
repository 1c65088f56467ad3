//! Layout rendering.
//!
//! The [`Template`] stage wraps each HTML file's contents in a named layout.
//! The layout comes from the file's `layout` metadata, falling back to the
//! stage default; a file with neither passes through untouched.
//!
//! ## Render Context
//!
//! | Name | Value |
//! |------|-------|
//! | `contents` | the file's current contents |
//! | `key` | the file's current output path |
//! | `file` | the file's own metadata |
//! | `site` | global site metadata |
//! | `collections` | name → list of entries |
//!
//! A collection entry exposes the member's metadata plus `key`, `id` and
//! `contents`. Members are resolved through the current tree and through the
//! trees parked by enclosing branches, so a page inside a branch can list
//! posts that live outside it.
//!
//! Engines sit behind the [`TemplateEngine`] trait and are looked up by name
//! with [`engine_for`]. Rendering fans out across files with rayon; every
//! layout sees the tree as it was when the stage started, and results are
//! applied in key order only once all files rendered.

use crate::config::ConfigError;
use crate::error::BuildError;
use crate::pipeline::Context;
use crate::tree::{File, FileTree, is_html};
use crate::value::{Metadata, Value};
use minijinja::{Environment, ErrorKind};
use rayon::prelude::*;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Metadata key naming a file's layout.
pub const LAYOUT_KEY: &str = "layout";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    Render(String),
}

/// A template engine that renders named templates against a [`RenderContext`].
pub trait TemplateEngine: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, template: &str, ctx: &RenderContext<'_>) -> Result<String, EngineError>;
}

#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    pub key: &'a str,
    pub contents: String,
    pub file: &'a Metadata,
    pub site: &'a Metadata,
    pub collections: &'a BTreeMap<String, Vec<EntryView<'a>>>,
}

/// One collection member as seen by a template.
#[derive(Debug, Clone)]
pub struct EntryView<'a> {
    pub key: &'a str,
    pub file: &'a File,
}

impl Serialize for EntryView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        const RESERVED: [&str; 3] = ["key", "id", "contents"];
        let metadata = &self.file.metadata;
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in metadata.iter().filter(|(k, _)| !RESERVED.contains(&k.as_str())) {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("key", self.key)?;
        map.serialize_entry("id", self.file.id())?;
        map.serialize_entry("contents", &self.file.text())?;
        map.end()
    }
}

// ============================================================================
// MiniJinja
// ============================================================================

pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl MiniJinjaEngine {
    /// Templates are loaded lazily from `directory` by relative path.
    pub fn new(directory: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(directory));
        Self { env }
    }

    /// An engine over in-memory templates: `(name, source)` pairs.
    pub fn from_templates<I, N, S>(templates: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut env = Environment::new();
        for (name, source) in templates {
            let name = name.into();
            env.add_template_owned(name.clone(), source.into())
                .map_err(|e| EngineError::Render(format!("{name}: {e}")))?;
        }
        Ok(Self { env })
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn name(&self) -> &str {
        "minijinja"
    }

    fn render(&self, template: &str, ctx: &RenderContext<'_>) -> Result<String, EngineError> {
        let tmpl = self.env.get_template(template).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => EngineError::NotFound(template.to_string()),
            _ => EngineError::Render(e.to_string()),
        })?;
        tmpl.render(ctx)
            .map_err(|e| EngineError::Render(e.to_string()))
    }
}

/// Look up an engine by name. Templates resolve relative to `directory`.
pub fn engine_for(name: &str, directory: &Path) -> Result<Arc<dyn TemplateEngine>, ConfigError> {
    match name {
        "minijinja" | "jinja" => Ok(Arc::new(MiniJinjaEngine::new(directory))),
        other => Err(ConfigError::Validation(format!(
            "unknown template engine `{other}` (available: minijinja)"
        ))),
    }
}

// ============================================================================
// Stage
// ============================================================================

pub struct Template {
    engine: Arc<dyn TemplateEngine>,
    default: Option<String>,
}

impl Template {
    pub fn new(engine: &str, directory: &Path, default: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self::with_engine(engine_for(engine, directory)?, default))
    }

    pub fn with_engine(engine: Arc<dyn TemplateEngine>, default: Option<String>) -> Self {
        Self { engine, default }
    }

    fn layout_for<'a>(&'a self, file: &'a File) -> Option<&'a str> {
        file.metadata
            .get(LAYOUT_KEY)
            .and_then(Value::as_str)
            .or(self.default.as_deref())
    }

    pub fn run(&self, tree: &mut FileTree, ctx: &mut Context) -> Result<(), BuildError> {
        let rendered = self.render_all(tree, ctx)?;
        for (key, html) in rendered {
            if let Some(file) = tree.get_mut(&key) {
                file.contents = html.into_bytes();
            }
        }
        Ok(())
    }

    fn render_all(&self, tree: &FileTree, ctx: &Context) -> Result<Vec<(String, String)>, BuildError> {
        let mut by_id: HashMap<&str, (&str, &File)> = HashMap::new();
        for (key, file) in ctx.outside_scope().chain(tree.iter()) {
            by_id.insert(file.id(), (key.as_str(), file));
        }
        let collections: BTreeMap<String, Vec<EntryView<'_>>> = ctx
            .collections()
            .iter()
            .map(|(name, ids)| {
                let entries = ids
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()))
                    .map(|&(key, file)| EntryView { key, file })
                    .collect();
                (name.clone(), entries)
            })
            .collect();

        let jobs: Vec<(&String, &File, &str)> = tree
            .iter()
            .filter(|(key, _)| is_html(key))
            .filter_map(|(key, file)| self.layout_for(file).map(|layout| (key, file, layout)))
            .collect();
        debug!(engine = self.engine.name(), files = jobs.len(), "rendering layouts");

        let site = ctx.metadata();
        let results: Vec<(String, Result<String, EngineError>)> = jobs
            .par_iter()
            .map(|&(key, file, layout)| {
                let render_ctx = RenderContext {
                    key,
                    contents: file.text().into_owned(),
                    file: &file.metadata,
                    site,
                    collections: &collections,
                };
                (key.clone(), self.engine.render(layout, &render_ctx))
            })
            .collect();

        results
            .into_iter()
            .map(|(key, result)| match result {
                Ok(html) => Ok((key, html)),
                Err(e) => Err(BuildError::Render {
                    path: key,
                    message: e.to_string(),
                }),
            })
            .collect()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("engine", &self.engine.name())
            .field("default", &self.default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{file, file_with, text_at, tree_of};

    fn stage(templates: &[(&str, &str)], default: Option<&str>) -> Template {
        let engine = MiniJinjaEngine::from_templates(templates.iter().copied()).unwrap();
        Template::with_engine(Arc::new(engine), default.map(String::from))
    }

    #[test]
    fn wraps_contents_in_default_layout() {
        let mut tree = tree_of(vec![file_with(
            "a.html",
            "<p>hi</p>",
            &[("title", Value::from("Hi"))],
        )]);
        let mut ctx = Context::default();
        ctx.metadata_mut().insert("title".into(), Value::from("Site"));

        stage(
            &[("page.html", "{{ site.title }}|{{ file.title }}|{{ contents|safe }}")],
            Some("page.html"),
        )
        .run(&mut tree, &mut ctx)
        .unwrap();

        assert_eq!(text_at(&tree, "a.html"), "Site|Hi|<p>hi</p>");
    }

    #[test]
    fn layout_metadata_overrides_default() {
        let mut tree = tree_of(vec![
            file_with("a.html", "A", &[("layout", Value::from("post.html"))]),
            file("b.html", "B"),
        ]);
        stage(
            &[("page.html", "page:{{ contents }}"), ("post.html", "post:{{ contents }}")],
            Some("page.html"),
        )
        .run(&mut tree, &mut Context::default())
        .unwrap();

        assert_eq!(text_at(&tree, "a.html"), "post:A");
        assert_eq!(text_at(&tree, "b.html"), "page:B");
    }

    #[test]
    fn non_html_and_layoutless_files_pass_through() {
        let mut tree = tree_of(vec![file("style.css", "body{}"), file("a.html", "A")]);
        stage(&[("page.html", "page")], None)
            .run(&mut tree, &mut Context::default())
            .unwrap();
        assert_eq!(text_at(&tree, "style.css"), "body{}");
        assert_eq!(text_at(&tree, "a.html"), "A");
    }

    #[test]
    fn collections_resolve_through_parked_trees() {
        let mut inside = tree_of(vec![file("index.html", "")]);
        let outside = tree_of(vec![
            file_with("posts/a.html", "first", &[("title", Value::from("A"))]),
            file_with("posts/b.html", "second", &[("title", Value::from("B"))]),
        ]);
        let mut ctx = Context::default();
        ctx.set_collection(
            "posts",
            vec!["posts/b.html".to_string(), "posts/a.html".to_string()],
        );

        let template = stage(
            &[(
                "list",
                "{% for p in collections.posts %}{{ p.title }}={{ p.key }}:{{ p.contents }};{% endfor %}",
            )],
            Some("list"),
        );
        let (_, result) = ctx.with_parked(outside, |ctx| template.run(&mut inside, ctx));
        result.unwrap();

        assert_eq!(
            text_at(&inside, "index.html"),
            "B=posts/b.html:second;A=posts/a.html:first;"
        );
    }

    #[test]
    fn every_layout_sees_pre_render_contents() {
        let mut tree = tree_of(vec![file("a.html", "A"), file("b.html", "B")]);
        let mut ctx = Context::default();
        ctx.set_collection("all", vec!["a.html".to_string(), "b.html".to_string()]);
        stage(
            &[(
                "t.html",
                "[{% for e in collections.all %}{{ e.contents }}{% endfor %}]",
            )],
            Some("t.html"),
        )
        .run(&mut tree, &mut ctx)
        .unwrap();
        assert_eq!(text_at(&tree, "a.html"), "[AB]");
        assert_eq!(text_at(&tree, "b.html"), "[AB]");
    }

    #[test]
    fn missing_layout_fails_with_path_and_leaves_tree() {
        let mut tree = tree_of(vec![
            file("a.html", "A"),
            file_with("b.html", "B", &[("layout", Value::from("nope.html"))]),
        ]);
        let err = stage(&[("page.html", "x")], Some("page.html"))
            .run(&mut tree, &mut Context::default())
            .unwrap_err();
        match err {
            BuildError::Render { path, message } => {
                assert_eq!(path, "b.html");
                assert!(message.contains("nope.html"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(text_at(&tree, "a.html"), "A");
    }

    #[test]
    fn template_errors_surface_as_render_errors() {
        let mut tree = tree_of(vec![file("a.html", "A")]);
        let err = stage(&[("bad.html", "{{ no_such_function() }}")], Some("bad.html"))
            .run(&mut tree, &mut Context::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::Render { ref path, .. } if path == "a.html"));
    }

    #[test]
    fn engines_are_found_by_name() {
        let dir = Path::new("layouts");
        assert_eq!(engine_for("minijinja", dir).unwrap().name(), "minijinja");
        assert_eq!(engine_for("jinja", dir).unwrap().name(), "minijinja");
        assert!(matches!(
            engine_for("handlebars", dir),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn engine_loads_templates_from_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("page.html"), "<main>{{ contents|safe }}</main>").unwrap();
        let mut tree = tree_of(vec![file("a.html", "<p>A</p>")]);
        Template::new("minijinja", tmp.path(), Some("page.html".to_string()))
            .unwrap()
            .run(&mut tree, &mut Context::default())
            .unwrap();
        assert_eq!(text_at(&tree, "a.html"), "<main><p>A</p></main>");
    }
}
