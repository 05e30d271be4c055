//! Error types for postforge.
//!
//! Library crates use [`PostforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::StageId;

/// Top-level error type for all postforge operations.
#[derive(Debug, thiserror::Error)]
pub enum PostforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A template definition lacks required text or cannot be parsed.
    #[error("invalid template source: {message}")]
    TemplateSourceInvalid { message: String },

    /// A template was requested by a name the store does not hold.
    #[error("template `{name}` not found")]
    TemplateNotFound { name: String },

    /// Rendering was attempted without a value for a declared placeholder.
    #[error("template `{template}` is missing a value for placeholder `{placeholder}`")]
    TemplateVariableMissing { template: String, placeholder: String },

    /// A capability call raised, returned garbage, or timed out.
    #[error("external call failed: {0}")]
    ExternalCall(String),

    /// Some, but not all, research queries failed. Never fatal.
    #[error("{failed} of {total} research queries failed")]
    PartialResearchFailure { failed: usize, total: usize },

    /// Every research query failed.
    #[error("all {attempted} research queries failed")]
    AllResearchFailed { attempted: usize },

    /// Generated text yielded no valid posts.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Content did not pass validation (length, emptiness, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A pipeline stage failed fatally.
    #[error("{stage} stage failed: {source}")]
    StageFailure {
        stage: StageId,
        #[source]
        source: Box<PostforgeError>,
    },

    /// The event consumer went away; the run stopped at a stage boundary.
    #[error("run cancelled: event consumer disconnected")]
    Cancelled,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PostforgeError>;

impl PostforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a template-source error from any displayable message.
    pub fn template_source(msg: impl Into<String>) -> Self {
        Self::TemplateSourceInvalid {
            message: msg.into(),
        }
    }

    /// Create an external call error from any displayable message.
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalCall(msg.into())
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap an error as the fatal failure of `stage`.
    pub fn stage(stage: StageId, source: PostforgeError) -> Self {
        Self::StageFailure {
            stage,
            source: Box::new(source),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The stage this error belongs to, if it is a stage failure.
    pub fn failed_stage(&self) -> Option<StageId> {
        match self {
            Self::StageFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
