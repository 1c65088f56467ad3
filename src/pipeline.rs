//! Stage contract, build context, and the pipeline driver.
//!
//! A [`Stage`] receives the whole [`FileTree`] and the build [`Context`],
//! mutates them in place, and either succeeds or fails with a
//! [`BuildError`] that aborts the rest of the build.
//!
//! The set of stages is closed: the built-in kinds plus [`Stage::Custom`],
//! which wraps any closure with the same signature. A [`Pipeline`] is an
//! ordered list of stages and is itself a stage, which is how branches nest.
//!
//! ```text
//! Site::run
//! └── Pipeline
//!     ├── Markdown
//!     ├── Collections
//!     ├── Branch "posts/**"
//!     │   └── Pipeline
//!     │       └── Permalinks
//!     └── Template
//! ```
//!
//! [`Site`] is the driver: it creates a fresh [`Context`] for every build, runs
//! the top-level stages in order, and after each one prunes collection entries
//! whose files a stage removed.

use crate::branch::Branch;
use crate::collections::Collections;
use crate::converters::{Excerpts, Markdown};
use crate::error::BuildError;
use crate::permalinks::Permalinks;
use crate::source::{self, LoadOptions};
use crate::template::Template;
use crate::tree::{File, FileTree};
use crate::value::Metadata;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Site metadata key under which collections are exposed to templates.
pub const COLLECTIONS_KEY: &str = "collections";

/// Shared, per-build state passed to every stage.
#[derive(Debug, Default)]
pub struct Context {
    metadata: Metadata,
    collections: BTreeMap<String, Vec<String>>,
    /// Trees set aside by enclosing branches, innermost last.
    parked: Vec<FileTree>,
}

impl Context {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// All collections: name → member file ids, in order.
    pub fn collections(&self) -> &BTreeMap<String, Vec<String>> {
        &self.collections
    }

    pub fn collection(&self, name: &str) -> Option<&[String]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    /// Replace a collection wholesale.
    pub fn set_collection(&mut self, name: impl Into<String>, ids: Vec<String>) {
        self.collections.insert(name.into(), ids);
    }

    /// Run `f` with `tree` set aside, then hand the tree back.
    ///
    /// Files in a parked tree are outside the current stage's scope but stay
    /// visible through [`Context::outside_scope`] for cross-file lookups.
    pub(crate) fn with_parked<R>(
        &mut self,
        tree: FileTree,
        f: impl FnOnce(&mut Self) -> R,
    ) -> (FileTree, R) {
        self.parked.push(tree);
        let result = f(self);
        // `parked` is private; every push here is matched by this pop.
        let Some(tree) = self.parked.pop() else {
            unreachable!("parked tree stack underflow");
        };
        (tree, result)
    }

    /// Files set aside by enclosing branches.
    pub fn outside_scope(&self) -> impl Iterator<Item = (&String, &File)> {
        self.parked.iter().flat_map(FileTree::iter)
    }

    /// Drop collection entries whose files are no longer in `tree`.
    /// Returns the number of entries removed.
    pub(crate) fn prune_collections(&mut self, tree: &FileTree) -> usize {
        let live: std::collections::HashSet<&str> = tree.iter().map(|(_, f)| f.id()).collect();
        let mut pruned = 0;
        for (name, ids) in &mut self.collections {
            let before = ids.len();
            ids.retain(|id| live.contains(id.as_str()));
            if ids.len() != before {
                debug!(collection = %name, removed = before - ids.len(), "pruned collection");
                pruned += before - ids.len();
            }
        }
        pruned
    }
}

type StageFn = dyn Fn(&mut FileTree, &mut Context) -> Result<(), BuildError> + Send + Sync;

/// A named closure conforming to the stage contract.
pub struct Custom {
    name: String,
    run: Box<StageFn>,
}

impl Custom {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&mut FileTree, &mut Context) -> Result<(), BuildError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Custom").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub enum Stage {
    Markdown(Markdown),
    Excerpts(Excerpts),
    Collections(Collections),
    Branch(Branch),
    Permalinks(Permalinks),
    Template(Template),
    Pipeline(Pipeline),
    Custom(Custom),
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Self::Markdown(_) => "markdown",
            Self::Excerpts(_) => "excerpts",
            Self::Collections(_) => "collections",
            Self::Branch(_) => "branch",
            Self::Permalinks(_) => "permalinks",
            Self::Template(_) => "template",
            Self::Pipeline(_) => "pipeline",
            Self::Custom(c) => &c.name,
        }
    }

    pub fn run(&self, tree: &mut FileTree, ctx: &mut Context) -> Result<(), BuildError> {
        debug!(stage = self.name(), files = tree.len(), "running stage");
        match self {
            Self::Markdown(s) => s.run(tree),
            Self::Excerpts(s) => s.run(tree),
            Self::Collections(s) => s.run(tree, ctx),
            Self::Branch(s) => s.run(tree, ctx),
            Self::Permalinks(s) => s.run(tree),
            Self::Template(s) => s.run(tree, ctx),
            Self::Pipeline(s) => s.run(tree, ctx),
            Self::Custom(s) => (s.run)(tree, ctx),
        }
    }
}

macro_rules! impl_into_stage {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Stage {
                fn from(stage: $variant) -> Self {
                    Stage::$variant(stage)
                }
            }
        )*
    };
}

impl_into_stage!(
    Markdown,
    Excerpts,
    Collections,
    Branch,
    Permalinks,
    Template,
    Pipeline,
    Custom
);

/// An ordered list of stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage (builder style).
    #[must_use]
    pub fn with(mut self, stage: impl Into<Stage>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn push(&mut self, stage: impl Into<Stage>) {
        self.stages.push(stage.into());
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first error.
    pub fn run(&self, tree: &mut FileTree, ctx: &mut Context) -> Result<(), BuildError> {
        for stage in &self.stages {
            stage.run(tree, ctx)?;
        }
        Ok(())
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<T: IntoIterator<Item = Stage>>(iter: T) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

/// The result of a successful build.
#[derive(Debug)]
pub struct Build {
    pub tree: FileTree,
    pub context: Context,
}

/// Pipeline driver: seed metadata plus the top-level pipeline.
#[derive(Debug)]
pub struct Site {
    metadata: Metadata,
    pipeline: Pipeline,
}

impl Site {
    /// Fails if `metadata` uses the reserved `collections` key.
    pub fn new(metadata: Metadata, pipeline: Pipeline) -> Result<Self, BuildError> {
        if metadata.contains_key(COLLECTIONS_KEY) {
            return Err(crate::config::ConfigError::Validation(format!(
                "metadata key `{COLLECTIONS_KEY}` is reserved"
            ))
            .into());
        }
        Ok(Self { metadata, pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the pipeline over an already-loaded tree.
    pub fn run(&self, mut tree: FileTree) -> Result<Build, BuildError> {
        let mut context = Context::new(self.metadata.clone());
        info!(files = tree.len(), stages = self.pipeline.len(), "build started");

        for stage in self.pipeline.stages() {
            stage.run(&mut tree, &mut context)?;
            context.prune_collections(&tree);
        }

        info!(files = tree.len(), "build finished");
        Ok(Build { tree, context })
    }

    /// Load `source` and run the pipeline over it.
    pub fn build(&self, source: &Path, options: &LoadOptions) -> Result<Build, BuildError> {
        let tree = source::load(source, options)?;
        self.run(tree)
    }
}
