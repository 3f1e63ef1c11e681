use git2::Oid;

use crate::domain::Commit;
use crate::error::{ReleaseError, Result};
use crate::git::Repository;

/// Resolve a branch, tag or revision to a commit id
///
/// Fails with [ReleaseError::HistoryUnavailable] naming the reference when it
/// cannot be found.
pub fn resolve_ref<R: Repository + ?Sized>(repo: &R, reference: &str) -> Result<Oid> {
    repo.resolve(reference)?
        .ok_or_else(|| ReleaseError::history_unavailable(reference))
}

/// Commits reachable from `source` but not from `target`, oldest first
///
/// Merge commits are included. Nothing in the repository is modified.
pub fn commits_between<R: Repository + ?Sized>(
    repo: &R,
    source: &str,
    target: &str,
) -> Result<Vec<Commit>> {
    let source_oid = resolve_ref(repo, source)?;
    let target_oid = resolve_ref(repo, target)?;
    repo.commits_between(source_oid, Some(target_oid))
}
