//! Release workflow for a single release line
//!
//! One [Orchestrator] drives one line through
//! `pending → merged → changelogged → tagged → pushed`, ending in `noop` when
//! there is nothing to release and in `failed` on any error.
//!
//! The remote is read at the start of every attempt and that read is the only
//! input for resuming an earlier run that stopped half way:
//!
//! - the line head is a changelog commit whose tag never reached the remote:
//!   tag it and push the tag alone
//! - a release tag above the line's last version sits on a descendant of the
//!   line head: fast-forward the line to it
//!
//! A line named `vN` only releases versions with major `N`; any other version
//! ends the attempt in `noop` naming the line it belongs to.
//!
//! Every push re-reads the remote first and fails with
//! [ReleaseError::Conflict] when a reference moved since the decision was
//! made. [Orchestrator::release_line] retries such an attempt once.

use std::fmt;

use chrono::NaiveDate;
use git2::Oid;
use tracing::{debug, error, info, warn};

use crate::analyzer::{resolve_ref, VersionAnalyzer, VersionDecision};
use crate::boundary::BoundaryWarning;
use crate::changelog::{ChangelogDocument, ChangelogGenerator};
use crate::config::Config;
use crate::domain::{LineTag, ReleaseLine, TagPattern, Version};
use crate::error::{ReleaseError, Result};
use crate::git::{describe_oid, short_oid, MergeOutcome, RefUpdate, RemoteState, Repository};

const CHANGELOG_MESSAGE_PREFIX: &str = "Update CHANGELOG for ";

pub fn merge_message(source: &str, line: &str) -> String {
    format!("Merge `{}` into `{}`", source, line)
}

pub fn changelog_message(tag: &str) -> String {
    format!("{}{}", CHANGELOG_MESSAGE_PREFIX, tag)
}

pub fn tag_message(tag: &str) -> String {
    format!("Automated release of {}", tag)
}

/// The `vN` line a version belongs to, when `line` tracks another major version
fn foreign_line(line: &ReleaseLine, version: &Version) -> Option<String> {
    match line.major_number() {
        Some(number) if number != version.major => Some(format!("v{}", version.major)),
        _ => None,
    }
}

/// Settings shared by every line of a run
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    /// Branch or revision whose commits are released
    pub source: String,
    pub tag_pattern: TagPattern,
    /// Changelog file, relative to the repository root
    pub changelog_path: String,
    pub analyzer: VersionAnalyzer,
    pub commit_url: Option<String>,
    /// Date written into new changelog sections
    pub date: NaiveDate,
    /// Stop after the changelog commit without touching any reference
    pub dry_run: bool,
}

impl ReleaseSettings {
    /// Settings from configuration, dated today
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(ReleaseSettings {
            source: config.release.source.clone(),
            tag_pattern: config.release.tag_pattern()?,
            changelog_path: config.release.changelog_path.clone(),
            analyzer: VersionAnalyzer::new(config.conventional_commits.clone()),
            commit_url: config.changelog.commit_url.clone(),
            date: chrono::Local::now().date_naive(),
            dry_run: false,
        })
    }

    pub fn generator(&self) -> ChangelogGenerator {
        ChangelogGenerator::new(self.tag_pattern.clone(), self.date)
            .with_commit_url(self.commit_url.clone())
    }
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        ReleaseSettings {
            source: "main".to_string(),
            tag_pattern: TagPattern::default(),
            changelog_path: "CHANGELOG.md".to_string(),
            analyzer: VersionAnalyzer::default(),
            commit_url: None,
            date: chrono::Local::now().date_naive(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Pending,
    Merged,
    Changelogged,
    Tagged,
    Pushed,
    Noop,
    Failed,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Merged => "merged",
            AttemptStatus::Changelogged => "changelogged",
            AttemptStatus::Tagged => "tagged",
            AttemptStatus::Pushed => "pushed",
            AttemptStatus::Noop => "noop",
            AttemptStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress of one attempt to release one line. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseAttempt {
    pub source_ref: String,
    pub target_line: String,
    pub merge_commit: Option<Oid>,
    pub changelog_commit: Option<Oid>,
    pub tag: Option<String>,
    pub status: AttemptStatus,
    pub warnings: Vec<BoundaryWarning>,
}

impl ReleaseAttempt {
    pub fn new(source_ref: &str, target_line: &str) -> Self {
        ReleaseAttempt {
            source_ref: source_ref.to_string(),
            target_line: target_line.to_string(),
            merge_commit: None,
            changelog_commit: None,
            tag: None,
            status: AttemptStatus::Pending,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, status: AttemptStatus) {
        debug!(line = %self.target_line, from = %self.status, to = %status, "attempt status changed");
        self.status = status;
    }

    fn warn(&mut self, warning: BoundaryWarning) {
        warn!(line = %self.target_line, "{}", warning);
        self.warnings.push(warning);
    }
}

/// How a line's release ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Branch and tag are on the remote; `resumed` when an earlier run did most of the work
    Released {
        version: Version,
        tag: String,
        resumed: bool,
    },
    /// Nothing to release
    Noop { reason: String },
    /// What a real run would have released
    DryRun { version: Version, tag: String },
}

/// Drives one release line through a release
pub struct Orchestrator<'a, R: Repository> {
    repo: &'a R,
    settings: &'a ReleaseSettings,
}

impl<'a, R: Repository> Orchestrator<'a, R> {
    pub fn new(repo: &'a R, settings: &'a ReleaseSettings) -> Self {
        Orchestrator { repo, settings }
    }

    /// Release `line`, retrying once when the remote moved underneath
    pub fn release_line(&self, line: &str) -> (ReleaseAttempt, Result<LineOutcome>) {
        let (attempt, result) = self.attempt(line);
        match result {
            Err(err) if err.is_conflict() => {
                warn!(line, error = %err, "remote moved during release, retrying with a fresh read");
                self.attempt(line)
            }
            result => (attempt, result),
        }
    }

    /// A single attempt, starting from a fresh read of the remote
    pub fn attempt(&self, line: &str) -> (ReleaseAttempt, Result<LineOutcome>) {
        let mut attempt = ReleaseAttempt::new(&self.settings.source, line);
        let result = self.run_attempt(&mut attempt);

        if let Err(err) = &result {
            error!(line, status = %attempt.status, error = %err, "release failed");
            attempt.advance(AttemptStatus::Failed);
        }

        (attempt, result)
    }

    fn run_attempt(&self, attempt: &mut ReleaseAttempt) -> Result<LineOutcome> {
        let line_name = attempt.target_line.clone();
        let source = self.settings.source.as_str();

        self.repo.fetch()?;
        let remote = self.repo.remote_state()?;

        let source_tip = match remote.branch(source) {
            Some(oid) => oid,
            None => resolve_ref(self.repo, source)?,
        };

        let line = self.load_line(&line_name, &remote, attempt)?;
        debug!(
            line = %line_name,
            head = %describe_oid(line.head),
            last_tag = ?line.last_tag.as_ref().map(|t| t.name.as_str()),
            "loaded release line"
        );

        if let Some(outcome) = self.resume_pending_tag(&line, &remote, attempt)? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.resume_orphan_tag(&line, &remote, attempt)? {
            return Ok(outcome);
        }

        // pending -> merged
        let old_head = line.head;
        let merged = match old_head {
            None => source_tip,
            Some(head) => {
                match self
                    .repo
                    .merge(head, source_tip, &merge_message(source, &line_name))?
                {
                    MergeOutcome::UpToDate => {
                        attempt.advance(AttemptStatus::Noop);
                        return Ok(LineOutcome::Noop {
                            reason: format!("'{}' is already merged into '{}'", source, line_name),
                        });
                    }
                    MergeOutcome::Conflicts(paths) => {
                        return Err(ReleaseError::MergeConflict {
                            line: line_name,
                            source_ref: source.to_string(),
                            paths,
                        });
                    }
                    MergeOutcome::Merged(oid) => {
                        attempt.merge_commit = Some(oid);
                        oid
                    }
                }
            }
        };
        attempt.advance(AttemptStatus::Merged);

        // merged -> changelogged
        let decision = self.settings.analyzer.analyze_repository_range(
            self.repo,
            merged,
            old_head,
            line.last_version(),
        )?;

        let VersionDecision::Release { version, bump, .. } = &decision else {
            if old_head != Some(merged) && !self.settings.dry_run {
                self.publish(&[RefUpdate::branch(&line_name, old_head, merged)])?;
            }
            attempt.advance(AttemptStatus::Noop);
            info!(line = %line_name, commits = decision.commits().len(), "no release-worthy commits");
            return Ok(LineOutcome::Noop {
                reason: "no release-worthy commits".to_string(),
            });
        };
        let version = *version;
        let tag = self.settings.tag_pattern.format(&version);

        if let Some(target) = foreign_line(&line, &version) {
            attempt.warn(BoundaryWarning::MajorVersionMismatch {
                line: line_name.clone(),
                version,
                target: target.clone(),
            });
            attempt.advance(AttemptStatus::Noop);
            return Ok(LineOutcome::Noop {
                reason: format!("{} belongs to release line '{}'", tag, target),
            });
        }

        let existing = match self.repo.read_file(merged, &self.settings.changelog_path)? {
            Some(text) => ChangelogDocument::parse(&text),
            None => ChangelogDocument::default(),
        };
        let document = self.settings.generator().render(&decision, &existing);
        let changelog_commit = self.repo.commit_file(
            merged,
            &self.settings.changelog_path,
            &document.to_markdown(),
            &changelog_message(&tag),
        )?;
        attempt.changelog_commit = Some(changelog_commit);
        attempt.tag = Some(tag.clone());
        attempt.advance(AttemptStatus::Changelogged);
        info!(line = %line_name, version = %version, bump = %bump, tag = %tag, "changelog updated");

        if self.settings.dry_run {
            return Ok(LineOutcome::DryRun { version, tag });
        }

        // changelogged -> tagged
        if let Some(target) = remote.tag(&tag) {
            return Err(ReleaseError::TagAlreadyExists {
                line: line_name,
                tag,
                target: short_oid(target),
            });
        }
        self.repo
            .create_tag(&tag, changelog_commit, &tag_message(&tag))?;
        attempt.advance(AttemptStatus::Tagged);

        // tagged -> pushed
        self.publish(&[
            RefUpdate::branch(&line_name, old_head, changelog_commit),
            RefUpdate::tag(&tag, changelog_commit),
        ])?;
        attempt.advance(AttemptStatus::Pushed);
        info!(line = %line_name, version = %version, tag = %tag, "released");

        Ok(LineOutcome::Released {
            version,
            tag,
            resumed: false,
        })
    }

    /// Read the line head and its highest reachable release tag
    fn load_line(
        &self,
        name: &str,
        remote: &RemoteState,
        attempt: &mut ReleaseAttempt,
    ) -> Result<ReleaseLine> {
        let mut line = ReleaseLine::new(name, remote.branch(name));
        let Some(head) = line.head else {
            attempt.warn(BoundaryWarning::NewReleaseLine {
                line: name.to_string(),
            });
            return Ok(line);
        };

        let pattern = &self.settings.tag_pattern;
        for (tag, target) in &remote.tags {
            let Some(version) = pattern.parse(tag) else {
                if pattern.resembles(tag) {
                    attempt.warn(BoundaryWarning::UnparsableTag {
                        tag: tag.clone(),
                        reason: "version part is not a plain X.Y.Z release".to_string(),
                    });
                }
                continue;
            };

            if line.last_version().is_some_and(|last| last >= version) {
                continue;
            }
            if self.repo.is_ancestor(*target, head)? {
                line.last_tag = Some(LineTag {
                    name: tag.clone(),
                    version,
                    target: *target,
                });
            }
        }

        Ok(line)
    }

    /// The branch reached the remote but its tag did not
    fn resume_pending_tag(
        &self,
        line: &ReleaseLine,
        remote: &RemoteState,
        attempt: &mut ReleaseAttempt,
    ) -> Result<Option<LineOutcome>> {
        let Some(head) = line.head else {
            return Ok(None);
        };
        let commit = self.repo.find_commit(head)?;
        let Some(tag) = commit.header().strip_prefix(CHANGELOG_MESSAGE_PREFIX) else {
            return Ok(None);
        };
        let Some(version) = self.settings.tag_pattern.parse(tag) else {
            return Ok(None);
        };

        match remote.tag(tag) {
            Some(target) if target == head => return Ok(None),
            Some(target) => {
                return Err(ReleaseError::TagAlreadyExists {
                    line: line.name.clone(),
                    tag: tag.to_string(),
                    target: short_oid(target),
                })
            }
            None => {}
        }

        info!(line = %line.name, tag, "resuming release: tag was never pushed");
        attempt.changelog_commit = Some(head);
        attempt.tag = Some(tag.to_string());
        attempt.advance(AttemptStatus::Changelogged);

        if self.settings.dry_run {
            return Ok(Some(LineOutcome::DryRun {
                version,
                tag: tag.to_string(),
            }));
        }

        self.repo.create_tag(tag, head, &tag_message(tag))?;
        attempt.advance(AttemptStatus::Tagged);
        self.publish(&[RefUpdate::tag(tag, head)])?;
        attempt.advance(AttemptStatus::Pushed);

        Ok(Some(LineOutcome::Released {
            version,
            tag: tag.to_string(),
            resumed: true,
        }))
    }

    /// The tag reached the remote but the branch did not
    fn resume_orphan_tag(
        &self,
        line: &ReleaseLine,
        remote: &RemoteState,
        attempt: &mut ReleaseAttempt,
    ) -> Result<Option<LineOutcome>> {
        let Some(orphan) = self.find_orphan_tag(line, remote)? else {
            return Ok(None);
        };

        info!(line = %line.name, tag = %orphan.name, "resuming release: branch was never updated");
        attempt.changelog_commit = Some(orphan.target);
        attempt.tag = Some(orphan.name.clone());
        attempt.advance(AttemptStatus::Tagged);

        if self.settings.dry_run {
            return Ok(Some(LineOutcome::DryRun {
                version: orphan.version,
                tag: orphan.name,
            }));
        }

        self.publish(&[RefUpdate::branch(&line.name, line.head, orphan.target)])?;
        attempt.advance(AttemptStatus::Pushed);

        Ok(Some(LineOutcome::Released {
            version: orphan.version,
            tag: orphan.name,
            resumed: true,
        }))
    }

    /// Highest release tag the line should already be at but is not
    ///
    /// For an existing line: a tag above its last version on a changelog
    /// commit for that tag, sitting on a merge into the line head. For a line that does not exist yet: a tag of the
    /// line's major version on a changelog commit for that tag which no remote
    /// branch contains.
    fn find_orphan_tag(&self, line: &ReleaseLine, remote: &RemoteState) -> Result<Option<LineTag>> {
        let pattern = &self.settings.tag_pattern;
        let mut best: Option<LineTag> = None;

        for (tag, target) in &remote.tags {
            let Some(version) = pattern.parse(tag) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.version >= version) {
                continue;
            }

            let is_orphan = match line.head {
                Some(head) => {
                    line.last_version().map_or(true, |last| version > last)
                        && self.is_release_of(*target, tag, head)?
                }
                None => {
                    line.major_number() == Some(version.major)
                        && self.repo.find_commit(*target)?.header() == changelog_message(tag)
                        && !self.reachable_from_any_branch(*target, remote)?
                }
            };

            if is_orphan {
                best = Some(LineTag {
                    name: tag.clone(),
                    version,
                    target: *target,
                });
            }
        }

        Ok(best)
    }

    /// Whether `target` is the changelog commit for `tag` on top of a merge into `head`
    fn is_release_of(&self, target: Oid, tag: &str, head: Oid) -> Result<bool> {
        let changelog = self.repo.find_commit(target)?;
        if changelog.header() != changelog_message(tag) {
            return Ok(false);
        }
        let Some(&merge) = changelog.parents.first() else {
            return Ok(false);
        };
        Ok(self.repo.find_commit(merge)?.parents.first() == Some(&head))
    }

    fn reachable_from_any_branch(&self, commit: Oid, remote: &RemoteState) -> Result<bool> {
        for tip in remote.branches.values() {
            if self.repo.is_ancestor(commit, *tip)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Push after checking that no reference moved since the decision was made
    fn publish(&self, updates: &[RefUpdate]) -> Result<()> {
        let current = self.repo.remote_state()?;
        for update in updates {
            let found = current.current(&update.reference);
            if found != update.expected {
                return Err(ReleaseError::Conflict {
                    reference: update.reference.full_name(),
                    expected: describe_oid(update.expected),
                    found: describe_oid(found),
                });
            }
        }

        self.repo.push(updates)
    }
}
