use crate::analyzer::history::resolve_ref;
use crate::boundary::BoundaryWarning;
use crate::domain::Classifier;
use crate::error::Result;
use crate::git::Repository;

/// Result of linting a commit range
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    /// Non-merge commits that were inspected
    pub checked: usize,
    pub warnings: Vec<BoundaryWarning>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Report every commit in `from..to` whose header does not follow the
/// conventional-commit grammar. Merge commits are skipped.
pub fn check_range<R: Repository + ?Sized>(
    repo: &R,
    classifier: &Classifier,
    from: &str,
    to: &str,
) -> Result<CheckReport> {
    let from_oid = resolve_ref(repo, from)?;
    let to_oid = resolve_ref(repo, to)?;

    let mut report = CheckReport::default();
    for commit in repo.commits_between(to_oid, Some(from_oid))? {
        if commit.is_merge() {
            continue;
        }
        report.checked += 1;

        if !classifier.is_conventional(&commit.message) {
            report.warnings.push(BoundaryWarning::NonConventionalCommit {
                hash: commit.hash.to_string(),
                header: commit.header().to_string(),
            });
        }
    }

    Ok(report)
}
