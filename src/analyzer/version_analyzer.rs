use git2::Oid;

use crate::config::ConventionalCommitsConfig;
use crate::domain::{ClassifiedCommit, Classifier, Commit, Version, VersionBump};
use crate::error::Result;
use crate::git::Repository;

/// Outcome of resolving the next version for a release line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
    /// `version` is strictly greater than `previous`
    Release {
        version: Version,
        bump: VersionBump,
        previous: Version,
        commits: Vec<ClassifiedCommit>,
    },
    /// No commit implies a bump
    NoReleaseNeeded { commits: Vec<ClassifiedCommit> },
}

impl VersionDecision {
    pub fn next_version(&self) -> Option<Version> {
        match self {
            VersionDecision::Release { version, .. } => Some(*version),
            VersionDecision::NoReleaseNeeded { .. } => None,
        }
    }

    pub fn commits(&self) -> &[ClassifiedCommit] {
        match self {
            VersionDecision::Release { commits, .. } => commits,
            VersionDecision::NoReleaseNeeded { commits } => commits,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self, VersionDecision::Release { .. })
    }
}

/// Largest bump implied by any of the commits
pub fn max_bump(commits: &[ClassifiedCommit]) -> Option<VersionBump> {
    commits.iter().filter_map(|c| c.category.bump()).max()
}

/// Decide the next version from classified commits and the line's last release
///
/// A line without a previous release starts from `0.0.0`.
pub fn resolve(commits: Vec<ClassifiedCommit>, last: Option<Version>) -> Result<VersionDecision> {
    let Some(bump) = max_bump(&commits) else {
        return Ok(VersionDecision::NoReleaseNeeded { commits });
    };

    let previous = last.unwrap_or_default();
    let version = previous.bump(bump)?;

    Ok(VersionDecision::Release {
        version,
        bump,
        previous,
        commits,
    })
}

/// Classifies commits and resolves the version they call for
#[derive(Debug, Clone, Default)]
pub struct VersionAnalyzer {
    classifier: Classifier,
}

impl VersionAnalyzer {
    /// Create a new version analyzer
    pub fn new(config: ConventionalCommitsConfig) -> Self {
        VersionAnalyzer {
            classifier: Classifier::new(config),
        }
    }

    /// Analyze commits from a repository between two commits
    pub fn analyze_repository_range<R: Repository + ?Sized>(
        &self,
        repo: &R,
        source: Oid,
        target: Option<Oid>,
        last: Option<Version>,
    ) -> Result<VersionDecision> {
        let commits = repo.commits_between(source, target)?;
        self.analyze_commits(&commits, last)
    }

    /// Classify commits, in order, and resolve the next version
    pub fn analyze_commits(&self, commits: &[Commit], last: Option<Version>) -> Result<VersionDecision> {
        let classified = commits
            .iter()
            .map(|commit| self.classifier.classify_commit(commit))
            .collect();
        resolve(classified, last)
    }

    /// Analyze bare commit messages
    pub fn analyze_messages(&self, messages: &[String], last: Option<Version>) -> Result<VersionDecision> {
        let classified = messages
            .iter()
            .map(|message| self.classifier.classify(message))
            .collect();
        resolve(classified, last)
    }
}
