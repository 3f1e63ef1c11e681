//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the git operations the
//! release engine needs, allowing for multiple implementations including a
//! real repository and an in-memory mock for testing.
//!
//! # Overview
//!
//! The primary abstraction is the [Repository] trait. The concrete
//! implementations include:
//!
//! - [repository::Git2Repository]: A real implementation using the `git2` crate
//! - [mock::MockRepository]: An in-memory commit graph and remote for testing
//!
//! The remote is the source of truth: [Repository::remote_state] reads the
//! branch and tag tips the remote currently advertises, and every decision the
//! orchestrator makes is based on such a read. Commits, merges and tags are
//! created locally as plain objects and only become visible through
//! [Repository::push].

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::{Git2Repository, Git2Workspace};

use std::collections::BTreeMap;
use std::fmt;

use git2::Oid;

use crate::domain::Commit;
use crate::error::Result;

/// Branch and tag tips as advertised by the remote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteState {
    /// Branch name (without `refs/heads/`) to tip commit
    pub branches: BTreeMap<String, Oid>,
    /// Tag name (without `refs/tags/`) to the commit it points at
    pub tags: BTreeMap<String, Oid>,
}

impl RemoteState {
    pub fn branch(&self, name: &str) -> Option<Oid> {
        self.branches.get(name).copied()
    }

    pub fn tag(&self, name: &str) -> Option<Oid> {
        self.tags.get(name).copied()
    }

    /// Current remote value of the reference an update targets
    pub fn current(&self, reference: &RefName) -> Option<Oid> {
        match reference {
            RefName::Branch(name) => self.branch(name),
            RefName::Tag(name) => self.tag(name),
        }
    }
}

/// A remote reference the engine may update
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefName {
    Branch(String),
    Tag(String),
}

impl RefName {
    pub fn full_name(&self) -> String {
        match self {
            RefName::Branch(name) => format!("refs/heads/{}", name),
            RefName::Tag(name) => format!("refs/tags/{}", name),
        }
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// One reference move in a push, with the remote value the decision was based on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub reference: RefName,
    /// Remote value when the decision was made; `None` means "must not exist"
    pub expected: Option<Oid>,
    pub new: Oid,
}

impl RefUpdate {
    pub fn branch(name: &str, expected: Option<Oid>, new: Oid) -> Self {
        RefUpdate {
            reference: RefName::Branch(name.to_string()),
            expected,
            new,
        }
    }

    pub fn tag(name: &str, new: Oid) -> Self {
        RefUpdate {
            reference: RefName::Tag(name.to_string()),
            expected: None,
            new,
        }
    }
}

/// Result of merging one commit into another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The source is already contained in the target
    UpToDate,
    /// A merge commit was created (not referenced by any branch yet)
    Merged(Oid),
    /// Conflicting paths, sorted; nothing was written
    Conflicts(Vec<String>),
}

/// Common git operation trait for abstraction
///
/// ## Thread Safety
///
/// Implementors must be `Send` so that each release line can run on its own
/// task with its own repository handle.
///
/// ## Error Handling
///
/// All methods return [crate::error::Result<T>]. Implementations map
/// underlying errors (like `git2::Error`) to [crate::error::ReleaseError]
/// variants; a name that cannot be resolved is reported as `Ok(None)` by
/// lookup methods rather than as an error.
pub trait Repository: Send {
    /// Download objects, branches and tags from the remote
    fn fetch(&self) -> Result<()>;

    /// Read the branch and tag tips the remote currently advertises
    fn remote_state(&self) -> Result<RemoteState>;

    /// Resolve a revision (branch, remote branch, tag, hash, `HEAD`) to a commit
    fn resolve(&self, revision: &str) -> Result<Option<Oid>>;

    fn find_commit(&self, oid: Oid) -> Result<Commit>;

    /// Commits reachable from `source` but not from `target`, oldest first
    ///
    /// Parents always come before their children. With no target the whole
    /// history of `source` is returned.
    fn commits_between(&self, source: Oid, target: Option<Oid>) -> Result<Vec<Commit>>;

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor)
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Merge `source` into `target` without touching any reference
    fn merge(&self, target: Oid, source: Oid, message: &str) -> Result<MergeOutcome>;

    /// Contents of a file in a commit's tree, `None` when absent
    fn read_file(&self, commit: Oid, path: &str) -> Result<Option<String>>;

    /// Create a commit on top of `parent` that replaces one file
    fn commit_file(&self, parent: Oid, path: &str, contents: &str, message: &str)
        -> Result<Oid>;

    /// Create (or replace) a local annotated tag
    fn create_tag(&self, name: &str, target: Oid, message: &str) -> Result<()>;

    /// Push all updates in one operation
    ///
    /// Fails with [crate::error::ReleaseError::PushRejected] listing the refs
    /// the remote refused; refs it accepted stay updated.
    fn push(&self, updates: &[RefUpdate]) -> Result<()>;
}

/// Short form of an object id for messages
pub fn short_oid(oid: Oid) -> String {
    oid.to_string()[..7].to_string()
}

/// Describe an optional remote value for conflict messages
pub fn describe_oid(oid: Option<Oid>) -> String {
    oid.map(short_oid).unwrap_or_else(|| "nothing".to_string())
}
