//! The terminal error type of a build.
//!
//! Every stage returns [`BuildError`]. Nothing inside the pipeline recovers
//! from one: the driver stops at the first error and hands it to the caller,
//! and the writer is never reached.

use crate::config::ConfigError;
use crate::pattern::PatternError;
use crate::source::LoadError;
use crate::writer::WriteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },
    #[error("Permalink collision at {path}: {first} and {second} resolve to the same output path")]
    PermalinkCollision {
        path: String,
        first: String,
        second: String,
    },
    #[error("Render error in {path}: {message}")]
    Render { path: String, message: String },
    #[error("Write error: {0}")]
    Write(#[from] WriteError),
}

impl BuildError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
