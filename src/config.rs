//! Site configuration module.
//!
//! Handles loading, validating, and compiling `site.toml`. The file names the
//! source and destination directories, seeds the global metadata, and lists
//! the pipeline as an ordered array of stage tables.
//!
//! ## Config File Location
//!
//! `site.toml` sits at the site root; every relative path in it resolves
//! against the directory containing the file:
//!
//! ```text
//! my-site/
//! ├── site.toml
//! ├── layouts/          # template directory
//! │   └── post.html
//! └── src/              # source root
//!     ├── index.md
//!     └── posts/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! source = "src"            # Source root
//! destination = "build"     # Output directory
//! clean = true              # Remove the destination before writing
//! ignore = ["drafts/**"]    # Source files left out of the tree
//!
//! [metadata]                # Global site metadata, visible as `site.*`
//! title = "My Site"
//!
//! [[pipeline]]
//! kind = "markdown"
//!
//! [[pipeline]]
//! kind = "collections"
//! [pipeline.collections.posts]
//! pattern = "posts/*.html"
//! sort_by = "publishDate"
//! reverse = true
//!
//! [[pipeline]]
//! kind = "branch"
//! patterns = ["posts/**"]
//! [[pipeline.pipeline]]
//! kind = "permalinks"
//! pattern = "blog/:publishDate/:title"
//! date_format = "YYYY/MMM"
//!
//! [[pipeline]]
//! kind = "template"
//! default = "page.html"
//! ```
//!
//! ## Stage Kinds
//!
//! | `kind` | Options |
//! |--------|---------|
//! | `markdown` | none |
//! | `excerpts` | none |
//! | `collections` | `collections.<name>` = `{ pattern, sort_by, reverse, limit }` |
//! | `branch` | `patterns`, nested `pipeline` |
//! | `permalinks` | `pattern`, `date_format`, `relative`, `slug` |
//! | `template` | `engine`, `directory`, `default` |
//!
//! Options tables may be sparse. Unknown keys are rejected to catch typos
//! early, except at the top level of a `collections` or `branch` entry.

use crate::branch::Branch;
use crate::collections::{CollectionSpec, Collections};
use crate::converters::{Excerpts, Markdown};
use crate::error::BuildError;
use crate::pattern::PatternSet;
use crate::permalinks::Permalinks;
use crate::pipeline::{COLLECTIONS_KEY, Pipeline, Site, Stage};
use crate::source::LoadOptions;
use crate::template::Template;
use crate::value::{Metadata, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name.
pub const CONFIG_FILE: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Source root, relative to the config file.
    pub source: String,
    /// Output directory, relative to the config file.
    pub destination: String,
    /// Remove the destination before writing.
    pub clean: bool,
    /// Globs of source files to leave out.
    pub ignore: Vec<String>,
    /// Global metadata seeded into every build.
    pub metadata: toml::Table,
    /// Top-level stages, in order.
    pub pipeline: Vec<StageConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source: "src".to_string(),
            destination: "build".to_string(),
            clean: true,
            ignore: Vec::new(),
            metadata: toml::Table::new(),
            pipeline: Vec::new(),
        }
    }
}

/// One pipeline entry, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    Markdown,
    Excerpts,
    Collections {
        collections: BTreeMap<String, CollectionConfig>,
    },
    Branch {
        patterns: Patterns,
        #[serde(default)]
        pipeline: Vec<StageConfig>,
    },
    Permalinks(PermalinkConfig),
    Template(TemplateConfig),
}

/// A single glob or a list of globs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Patterns {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(p) => std::slice::from_ref(p),
            Self::Many(ps) => ps,
        }
    }

    pub fn compile(&self) -> Result<PatternSet, BuildError> {
        Ok(PatternSet::new(self.as_slice())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    pub pattern: Patterns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermalinkConfig {
    /// Path template, e.g. `blog/:publishDate/:title`.
    pub pattern: String,
    /// Layout for date tokens: `YYYY`, `YY`, `MMMM`, `MMM`, `MM`, `M`, `DD`, `D`.
    pub date_format: String,
    /// Prefix the file's source directory.
    pub relative: bool,
    /// Slugify non-date token values.
    pub slug: bool,
}

impl Default for PermalinkConfig {
    fn default() -> Self {
        Self {
            pattern: ":title".to_string(),
            date_format: "YYYY/MM/DD".to_string(),
            relative: false,
            slug: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    /// Engine name (`minijinja`, alias `jinja`).
    pub engine: String,
    /// Template directory, relative to the config file.
    pub directory: String,
    /// Layout for files without `layout` metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            engine: "minijinja".to_string(),
            directory: "layouts".to_string(),
            default: None,
        }
    }
}

impl SiteConfig {
    /// Validate values that deserialize fine but cannot build a site.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Validation("source must not be empty".into()));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Validation(
                "destination must not be empty".into(),
            ));
        }
        if Path::new(&self.source) == Path::new(&self.destination) {
            return Err(ConfigError::Validation(
                "source and destination must differ".into(),
            ));
        }
        if self.metadata.contains_key(COLLECTIONS_KEY) {
            return Err(ConfigError::Validation(format!(
                "metadata key `{COLLECTIONS_KEY}` is reserved"
            )));
        }
        validate_stages(&self.pipeline, "pipeline")
    }

    /// Global metadata as typed values.
    pub fn site_metadata(&self) -> Metadata {
        self.metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }

    pub fn source_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.source)
    }

    pub fn destination_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.destination)
    }

    pub fn load_options(&self) -> Result<LoadOptions, BuildError> {
        Ok(LoadOptions::ignoring(&self.ignore)?)
    }

    /// Compile the configured pipeline into a [`Site`]. Relative paths in
    /// stage options resolve against `base`.
    pub fn site(&self, base: &Path) -> Result<Site, BuildError> {
        Site::new(self.site_metadata(), build_pipeline(&self.pipeline, base)?)
    }
}

fn validate_stages(stages: &[StageConfig], at: &str) -> Result<(), ConfigError> {
    for (i, stage) in stages.iter().enumerate() {
        let at = format!("{at}[{i}]");
        match stage {
            StageConfig::Collections { collections } => {
                if collections.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "{at}: collections stage defines no collections"
                    )));
                }
                for (name, c) in collections {
                    if c.pattern.as_slice().is_empty() {
                        return Err(ConfigError::Validation(format!(
                            "{at}: collection `{name}` has no pattern"
                        )));
                    }
                }
            }
            StageConfig::Branch { patterns, pipeline } => {
                if patterns.as_slice().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "{at}: branch has no patterns"
                    )));
                }
                validate_stages(pipeline, &format!("{at}.pipeline"))?;
            }
            StageConfig::Template(t) if t.directory.trim().is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "{at}: template directory must not be empty"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Compile stage configs into a runnable [`Pipeline`].
///
/// Patterns are compiled, date formats parsed and template engines resolved
/// here, so a bad glob or engine name fails before any file is loaded.
pub fn build_pipeline(stages: &[StageConfig], base: &Path) -> Result<Pipeline, BuildError> {
    stages
        .iter()
        .map(|stage| -> Result<Stage, BuildError> {
            Ok(match stage {
                StageConfig::Markdown => Markdown::new().into(),
                StageConfig::Excerpts => Excerpts::new().into(),
                StageConfig::Collections { collections } => {
                    let mut stage = Collections::new();
                    for (name, c) in collections {
                        let mut spec = CollectionSpec::new(c.pattern.compile()?)
                            .reverse(c.reverse)
                            .limit(c.limit);
                        if let Some(key) = &c.sort_by {
                            spec = spec.sort_by(key.clone());
                        }
                        stage = stage.define(name.clone(), spec);
                    }
                    stage.into()
                }
                StageConfig::Branch { patterns, pipeline } => {
                    Branch::new(patterns.compile()?, build_pipeline(pipeline, base)?).into()
                }
                StageConfig::Permalinks(p) => {
                    Permalinks::new(&p.pattern, &p.date_format, p.relative)?
                        .slug(p.slug)
                        .into()
                }
                StageConfig::Template(t) => {
                    Template::new(&t.engine, &base.join(&t.directory), t.default.clone())?.into()
                }
            })
        })
        .collect()
}

// =============================================================================
// Config loading and merging
// =============================================================================

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Deep-merge two TOML values. Tables merge key by key; anything else in
/// `overlay` replaces `base` wholesale (arrays included).
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, falling back to stock defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `site.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pressroom Site Configuration
# ============================
# All top-level settings are optional. Values shown are the defaults.
# Relative paths resolve against the directory containing this file.
# Unknown keys will cause an error.

# Source root: every file below it is loaded into the build.
source = "src"

# Output directory.
destination = "build"

# Remove the output directory before writing.
clean = true

# Globs of source files to leave out (hidden files are always skipped).
ignore = []

# ---------------------------------------------------------------------------
# Global metadata, available to templates as `site.*`.
# The key `collections` is reserved.
# ---------------------------------------------------------------------------
[metadata]
# title = "My Site"

# ---------------------------------------------------------------------------
# Pipeline: stages run top to bottom.
# ---------------------------------------------------------------------------
# Render Markdown to HTML (page.md -> page.html).
# [[pipeline]]
# kind = "markdown"
#
# Store each page's first paragraph as `excerpt`.
# [[pipeline]]
# kind = "excerpts"
#
# Named, sorted file lists, available to templates as `collections.<name>`.
# Files missing `sort_by` sort last (first when `reverse = true`).
# [[pipeline]]
# kind = "collections"
# [pipeline.collections.posts]
# pattern = "posts/*.html"
# sort_by = "publishDate"
# reverse = true
# limit = 10
#
# Run a nested pipeline over matching files only.
# Patterns are globs; a leading `!` excludes, and the last match wins.
# [[pipeline]]
# kind = "branch"
# patterns = ["posts/**"]
#
#   Move each post to blog/<date>/<title>/index.html.
#   Date tokens: YYYY YY MMMM MMM MM M DD D.
#   [[pipeline.pipeline]]
#   kind = "permalinks"
#   pattern = "blog/:publishDate/:title"
#   date_format = "YYYY/MMM"
#   relative = false
#   slug = true
#
# Wrap HTML files in a layout (`layout` metadata, else `default`).
# [[pipeline]]
# kind = "template"
# engine = "minijinja"
# directory = "layouts"
# default = "page.html"
"##
}
