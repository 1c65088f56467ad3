//! Scoped sub-pipelines.
//!
//! A [`Branch`] runs its inner [`Pipeline`] over only the files whose keys
//! match its [`PatternSet`], then merges the result back:
//!
//! ```text
//! tree ──partition──► matched ──inner pipeline──► matched'
//!   │                                                │
//!   └──────── unmatched ─────────── merge ◄──────────┘
//! ```
//!
//! Renames and removals made by the inner pipeline carry through the merge.
//! While the inner pipeline runs, the unmatched files are parked in the
//! [`Context`] so templates inside the branch can still resolve collection
//! members that live outside it.
//!
//! Sibling branches in sequence express mutually exclusive routing: each one
//! sees the output of the previous.

use crate::error::BuildError;
use crate::pattern::{PatternError, PatternSet};
use crate::pipeline::{Context, Pipeline, Stage};
use crate::tree::FileTree;
use tracing::debug;

#[derive(Debug)]
pub struct Branch {
    patterns: PatternSet,
    pipeline: Pipeline,
}

impl Branch {
    pub fn new(patterns: PatternSet, pipeline: Pipeline) -> Self {
        Self { patterns, pipeline }
    }

    /// A branch with an empty inner pipeline, from raw globs.
    pub fn matching<I, S>(globs: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(PatternSet::new(globs)?, Pipeline::new()))
    }

    /// Append a stage to the inner pipeline (builder style).
    #[must_use]
    pub fn with(mut self, stage: impl Into<Stage>) -> Self {
        self.pipeline.push(stage);
        self
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn run(&self, tree: &mut FileTree, ctx: &mut Context) -> Result<(), BuildError> {
        let mut matched = tree.partition(&self.patterns);
        debug!(
            matched = matched.len(),
            unmatched = tree.len(),
            "branch partitioned tree"
        );

        let unmatched = std::mem::take(tree);
        let (unmatched, outcome) =
            ctx.with_parked(unmatched, |ctx| self.pipeline.run(&mut matched, ctx));
        *tree = unmatched;
        outcome?;

        tree.merge(matched)
    }
}
