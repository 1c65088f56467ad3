//! # Pressroom
//!
//! A static site builder. A directory of source documents is loaded into an
//! in-memory file tree and run through an ordered, composable pipeline of
//! stages; the finished tree is written to the output directory.
//!
//! # Architecture: One Tree, Many Stages
//!
//! ```text
//! src/  ──load──►  FileTree  ──stage──►  ...  ──stage──►  FileTree  ──write──►  build/
//!                      ▲                                      │
//!                      └──────────── Context (site metadata, collections)
//! ```
//!
//! Every stage receives the whole tree and the build [`pipeline::Context`] by
//! mutable reference, changes them in place, and either succeeds or aborts
//! the build. Stages compose: a [`branch::Branch`] runs a nested pipeline
//! over the files matching a glob set and merges the result back, and
//! branches nest.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`tree`] | The file tree: keys, stable ids, two-phase renames |
//! | [`value`] | Typed metadata values shared by frontmatter and site config |
//! | [`pattern`] | Globs with `!` negation and last-match-wins evaluation |
//! | [`pipeline`] | Stage contract, build context, pipeline driver ([`pipeline::Site`]) |
//! | [`branch`] | Scoped sub-pipelines over a pattern-matched subset |
//! | [`collections`] | Named, sorted file lists published to the context |
//! | [`permalinks`] | Output paths computed from metadata templates |
//! | [`template`] | Layout rendering through a pluggable template engine |
//! | [`converters`] | Markdown → HTML and excerpt extraction |
//! | [`source`] | Loads the source directory and its YAML frontmatter |
//! | [`writer`] | Writes the finished tree to disk |
//! | [`config`] | `site.toml` loading, validation, and pipeline compilation |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | Tracing subscriber setup |
//!
//! # Design Decisions
//!
//! ## Keys Move, Ids Don't
//!
//! A file's tree key is its current output path and changes whenever a stage
//! renames it. Its [`tree::File::id`] is the source path and never changes.
//! Collections store ids, so a post collected before its permalink is computed
//! still resolves afterwards.
//!
//! ## All-or-Nothing Builds
//!
//! There is no partial output. Renames validate a complete plan before moving
//! anything, the first stage error stops the pipeline, and the writer only
//! runs after every stage succeeded. Two posts resolving to the same permalink
//! leave the destination exactly as it was.
//!
//! ## Fresh State Per Build
//!
//! Nothing carries over between builds: no cache, no incremental rebuild.
//! Every build gets a new context, so collections are recomputed from scratch
//! and the same input always produces byte-identical output.

pub mod branch;
pub mod collections;
pub mod config;
pub mod converters;
pub mod error;
pub mod logging;
pub mod output;
pub mod pattern;
pub mod permalinks;
pub mod pipeline;
pub mod source;
pub mod template;
pub mod tree;
pub mod value;
pub mod writer;

pub use error::BuildError;
pub use pipeline::{Build, Context, Pipeline, Site, Stage};
pub use tree::{File, FileTree};

#[cfg(test)]
pub(crate) mod test_helpers;
