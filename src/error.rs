use thiserror::Error;

use crate::domain::{Version, VersionBump};

/// Unified error type for releaser operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A branch, tag or revision could not be resolved
    #[error("History unavailable: cannot resolve '{reference}'")]
    HistoryUnavailable { reference: String },

    /// Merging the source into a release line produced conflicts
    #[error(
        "Merge conflict merging '{source_ref}' into '{line}' in: {}",
        .paths.join(", ")
    )]
    MergeConflict {
        line: String,
        source_ref: String,
        paths: Vec<String>,
    },

    #[error("Version overflow: cannot apply a {bump} bump to {version}")]
    VersionOverflow { version: Version, bump: VersionBump },

    /// The computed tag exists and does not point at the release commit
    #[error("Tag '{tag}' already exists at {target} (release line '{line}')")]
    TagAlreadyExists {
        line: String,
        tag: String,
        target: String,
    },

    /// The remote moved since the read that informed the decision
    #[error("Remote moved: '{reference}' expected at {expected} but found at {found}")]
    Conflict {
        reference: String,
        expected: String,
        found: String,
    },

    #[error("Remote rejected push of {}", .refs.join(", "))]
    PushRejected { refs: Vec<String> },
}

/// Convenience type alias for Results in releaser
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        ReleaseError::Version(msg.into())
    }

    /// Create a tag error with context
    pub fn tag(msg: impl Into<String>) -> Self {
        ReleaseError::Tag(msg.into())
    }

    /// Create a remote error with context
    pub fn remote(msg: impl Into<String>) -> Self {
        ReleaseError::Remote(msg.into())
    }

    pub fn history_unavailable(reference: impl Into<String>) -> Self {
        ReleaseError::HistoryUnavailable {
            reference: reference.into(),
        }
    }

    /// Whether the error signals a remote that moved under us and is worth
    /// one retry with a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReleaseError::Conflict { .. })
    }
}
