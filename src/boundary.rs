use std::fmt;

use crate::domain::Version;

/// Non-fatal findings made while reading history and tags.
/// These never stop a release but should be reported to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryWarning {
    /// Commit header does not follow the conventional-commit grammar
    NonConventionalCommit { hash: String, header: String },
    /// Tag resembles the release tag pattern but cannot be parsed as a version
    UnparsableTag { tag: String, reason: String },
    /// The release line branch does not exist on the remote yet
    NewReleaseLine { line: String },
    /// The next version has a major number other than the line's
    MajorVersionMismatch {
        line: String,
        version: Version,
        target: String,
    },
}

impl fmt::Display for BoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryWarning::NonConventionalCommit { hash, header } => {
                let short_hash = if hash.len() > 7 { &hash[..7] } else { hash.as_str() };
                write!(
                    f,
                    "Commit {} is not a conventional commit: '{}'",
                    short_hash, header
                )
            }
            BoundaryWarning::UnparsableTag { tag, reason } => {
                write!(f, "Cannot parse tag '{}': {}", tag, reason)
            }
            BoundaryWarning::NewReleaseLine { line } => {
                write!(
                    f,
                    "Release line '{}' does not exist on the remote and will be created",
                    line
                )
            }
            BoundaryWarning::MajorVersionMismatch {
                line,
                version,
                target,
            } => {
                write!(
                    f,
                    "Version {} belongs to release line '{}', not '{}'; release it there",
                    version, target, line
                )
            }
        }
    }
}
