//! Runs several release lines at once
//!
//! Lines are released in parallel with rayon, each with its own repository
//! handle. Releases of the same line are serialized through a lock table kept
//! by the [ReleaseRunner], so a line listed twice, or released from two
//! threads sharing a runner, never has two attempts in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cli::orchestration::{LineOutcome, Orchestrator, ReleaseAttempt, ReleaseSettings};
use crate::domain::branch::latest_line;
use crate::error::Result;
use crate::git::Repository;

/// Line used when nothing is requested, configured, or found on the remote
pub const DEFAULT_LINE: &str = "v0";

/// Which lines to release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseRequest {
    /// Empty means the highest `vN` branch on the remote
    pub lines: Vec<String>,
}

/// Result for one line of a run
#[derive(Debug)]
pub struct LineReport {
    pub line: String,
    /// Absent when the repository could not be opened for the line
    pub attempt: Option<ReleaseAttempt>,
    pub result: Result<LineOutcome>,
}

impl LineReport {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }

    /// `<line>: released <version>`, `<line>: noop` or `<line>: failed: <reason>`
    pub fn summary(&self) -> String {
        match &self.result {
            Ok(LineOutcome::Released { version, .. }) => {
                format!("{}: released {}", self.line, version)
            }
            Ok(LineOutcome::Noop { .. }) => format!("{}: noop", self.line),
            Ok(LineOutcome::DryRun { version, .. }) => {
                format!("{}: would release {}", self.line, version)
            }
            Err(err) => format!("{}: failed: {}", self.line, err),
        }
    }
}

/// Results of a run, in request order
#[derive(Debug, Default)]
pub struct RunReport {
    pub lines: Vec<LineReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.lines.iter().any(LineReport::is_failure)
    }

    /// Process exit code: non-zero when any line failed
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }

    pub fn line(&self, name: &str) -> Option<&LineReport> {
        self.lines.iter().find(|report| report.line == name)
    }
}

/// Releases lines in parallel, one orchestrator per line
pub struct ReleaseRunner {
    settings: ReleaseSettings,
    line_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReleaseRunner {
    pub fn new(settings: ReleaseSettings) -> Self {
        ReleaseRunner {
            settings,
            line_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Release every requested line
    ///
    /// `open` is called once per line to get that line's repository handle.
    /// Failures are reported per line; only failing to pick the lines to
    /// release is an error for the whole run.
    pub fn run<R, F>(&self, open: F, request: &ReleaseRequest) -> Result<RunReport>
    where
        R: Repository,
        F: Fn() -> Result<R> + Sync,
    {
        let lines = self.select_lines(&open, request)?;
        info!(lines = ?lines, source = %self.settings.source, dry_run = self.settings.dry_run, "starting release");

        let reports = lines
            .par_iter()
            .map(|line| self.run_line(&open, line))
            .collect();

        Ok(RunReport { lines: reports })
    }

    fn select_lines<R, F>(&self, open: &F, request: &ReleaseRequest) -> Result<Vec<String>>
    where
        R: Repository,
        F: Fn() -> Result<R>,
    {
        if !request.lines.is_empty() {
            return Ok(request.lines.clone());
        }

        let repo = open()?;
        repo.fetch()?;
        let remote = repo.remote_state()?;
        let line = latest_line(remote.branches.keys().map(String::as_str)).unwrap_or(DEFAULT_LINE);
        debug!(line, "no lines requested, using the latest release line");

        Ok(vec![line.to_string()])
    }

    fn line_lock(&self, line: &str) -> Arc<Mutex<()>> {
        let mut locks = self.line_locks.lock();
        Arc::clone(locks.entry(line.to_string()).or_default())
    }

    fn run_line<R, F>(&self, open: &F, line: &str) -> LineReport
    where
        R: Repository,
        F: Fn() -> Result<R>,
    {
        let lock = self.line_lock(line);
        let _guard = lock.lock();

        let repo = match open() {
            Ok(repo) => repo,
            Err(err) => {
                return LineReport {
                    line: line.to_string(),
                    attempt: None,
                    result: Err(err),
                }
            }
        };

        let (attempt, result) = Orchestrator::new(&repo, &self.settings).release_line(line);
        LineReport {
            line: line.to_string(),
            attempt: Some(attempt),
            result,
        }
    }
}
