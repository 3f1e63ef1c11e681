// tests/cli_orchestration_test.rs
//
// Release scenarios driven end to end against the in-memory repository.

use chrono::NaiveDate;
use git2::Oid;

use releaser::boundary::BoundaryWarning;
use releaser::cli::{
    AttemptStatus, LineOutcome, Orchestrator, ReleaseRequest, ReleaseRunner, ReleaseSettings,
};
use releaser::domain::Version;
use releaser::git::MockRepository;
use releaser::{ReleaseError, Result};

fn settings_on(day: u32) -> ReleaseSettings {
    ReleaseSettings {
        date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
        ..ReleaseSettings::default()
    }
}

fn release(repo: &MockRepository, settings: &ReleaseSettings, line: &str) -> Result<LineOutcome> {
    Orchestrator::new(repo, settings).release_line(line).1
}

fn released(major: u64, minor: u64, patch: u64, resumed: bool) -> LineOutcome {
    let version = Version::new(major, minor, patch);
    LineOutcome::Released {
        version,
        tag: format!("v{}", version),
        resumed,
    }
}

fn short(oid: Oid) -> String {
    oid.to_string()[..7].to_string()
}

fn changelog(repo: &MockRepository, line: &str) -> String {
    let head = repo.remote_branch(line).expect("line exists");
    repo.file_at(head, "CHANGELOG.md").expect("changelog exists")
}

// ============================================================================
// Release scenario
// ============================================================================

#[test]
fn test_release_scenario_across_two_lines() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[("README.md", "hello")]);
    let feat = repo.commit(&[root], "feat(scope1): add a new feature", &[("src/a.rs", "a")]);
    repo.set_remote_branch("main", feat);

    // First release creates v0 at the source tip
    let outcome = release(&repo, &settings_on(1), "v0").unwrap();
    assert_eq!(outcome, released(0, 1, 0, false));

    let v0_first = repo.remote_branch("v0").unwrap();
    assert_eq!(repo.parents_of(v0_first), vec![feat]);
    assert_eq!(
        repo.message_of(v0_first).as_deref(),
        Some("Update CHANGELOG for v0.1.0")
    );
    assert_eq!(repo.remote_tag("v0.1.0"), Some(v0_first));
    assert_eq!(
        repo.local_tag("v0.1.0"),
        Some((v0_first, "Automated release of v0.1.0".to_string()))
    );
    assert_eq!(
        changelog(&repo, "v0"),
        format!(
            "# Changelog\n\n## v0.1.0 (2024-08-01)\n\n### Features\n\n- **scope1**: add a new feature ({})\n\n### Other\n\n- init ({})\n",
            short(feat),
            short(root)
        )
    );

    // A fix on main becomes a patch release, merged into v0
    let fix = repo.commit(&[feat], "fix: correct a bug", &[("src/a.rs", "b")]);
    repo.set_remote_branch("main", fix);

    let outcome = release(&repo, &settings_on(2), "v0").unwrap();
    assert_eq!(outcome, released(0, 1, 1, false));

    let v0_second = repo.remote_branch("v0").unwrap();
    let merge = repo.parents_of(v0_second)[0];
    assert_eq!(repo.parents_of(merge), vec![v0_first, fix]);
    assert_eq!(
        repo.message_of(merge).as_deref(),
        Some("Merge `main` into `v0`")
    );
    assert_eq!(repo.file_at(v0_second, "src/a.rs").as_deref(), Some("b"));

    let text = changelog(&repo, "v0");
    assert!(text.starts_with(&format!(
        "# Changelog\n\n## v0.1.1 (2024-08-02)\n\n### Fixes\n\n- correct a bug ({})\n\n### Other\n\n- Merge `main` into `v0` ({})\n\n## v0.1.0 (2024-08-01)\n",
        short(fix),
        short(merge)
    )));

    // Running again with nothing new is a no-op
    let outcome = release(&repo, &settings_on(2), "v0").unwrap();
    assert!(matches!(outcome, LineOutcome::Noop { .. }));
    assert_eq!(repo.remote_branch("v0"), Some(v0_second));

    // A breaking change on main starts a fresh v1 line at 1.0.0
    let breaking = repo.commit(&[fix], "feat!: drop the legacy API", &[("src/a.rs", "c")]);
    repo.set_remote_branch("main", breaking);

    let outcome = release(&repo, &settings_on(3), "v1").unwrap();
    assert_eq!(outcome, released(1, 0, 0, false));
    assert!(changelog(&repo, "v1").contains("## v1.0.0 (2024-08-03)\n\n### Breaking Changes\n\n- drop the legacy API"));
    assert_eq!(repo.remote_branch("v0"), Some(v0_second));
    assert_eq!(
        repo.remote_tags(),
        vec!["v0.1.0".to_string(), "v0.1.1".to_string(), "v1.0.0".to_string()]
    );
}

#[test]
fn test_breaking_change_is_left_to_the_next_line() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: add a new feature", &[("a.txt", "a")]);
    repo.set_remote_branch("main", feat);
    assert_eq!(release(&repo, &settings_on(1), "v0").unwrap(), released(0, 1, 0, false));
    let v0_head = repo.remote_branch("v0").unwrap();

    let breaking = repo.commit(&[feat], "feat!: breaking change", &[("a.txt", "b")]);
    repo.set_remote_branch("main", breaking);

    let (attempt, result) = Orchestrator::new(&repo, &settings_on(2)).release_line("v0");
    match result.unwrap() {
        LineOutcome::Noop { reason } => assert_eq!(reason, "v1.0.0 belongs to release line 'v1'"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(attempt.status, AttemptStatus::Noop);
    assert_eq!(
        attempt.warnings,
        vec![BoundaryWarning::MajorVersionMismatch {
            line: "v0".to_string(),
            version: Version::new(1, 0, 0),
            target: "v1".to_string(),
        }]
    );
    assert_eq!(repo.remote_branch("v0"), Some(v0_head));
    assert_eq!(repo.remote_tags(), vec!["v0.1.0".to_string()]);

    assert_eq!(release(&repo, &settings_on(2), "v1").unwrap(), released(1, 0, 0, false));
    assert_eq!(repo.remote_tag("v1.0.0"), repo.remote_branch("v1"));
    assert_eq!(repo.remote_branch("v0"), Some(v0_head));
}

#[test]
fn test_new_line_without_breaking_change_is_noop() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "feat: first", &[]);
    repo.set_remote_branch("main", root);

    let result = release(&repo, &settings_on(1), "v1").unwrap();
    assert_eq!(
        result,
        LineOutcome::Noop {
            reason: "v0.1.0 belongs to release line 'v0'".to_string()
        }
    );
    assert_eq!(repo.remote_branch("v1"), None);
    assert!(repo.remote_tags().is_empty());
}

#[test]
fn test_other_commits_only_push_the_merge() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let docs = repo.commit(&[root], "docs: explain", &[("README.md", "docs")]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", docs);

    let outcome = release(&repo, &settings_on(1), "v0").unwrap();
    assert!(matches!(outcome, LineOutcome::Noop { .. }));

    let head = repo.remote_branch("v0").unwrap();
    assert_eq!(repo.parents_of(head), vec![root, docs]);
    assert!(repo.remote_tags().is_empty());
}

#[test]
fn test_existing_changelog_is_extended() {
    let repo = MockRepository::new();
    let root = repo.commit(
        &[],
        "chore: init",
        &[("CHANGELOG.md", "# Changelog\n\nIntro text.\n\n## 0.0.9 - legacy\n\n* kept as is\n")],
    );
    let feat = repo.commit(&[root], "feat: new", &[]);
    repo.set_remote_branch("main", feat);

    release(&repo, &settings_on(1), "v0").unwrap();

    let text = changelog(&repo, "v0");
    assert!(text.starts_with("# Changelog\n\nIntro text.\n\n## v0.1.0 (2024-08-01)\n"));
    assert!(text.ends_with("## 0.0.9 - legacy\n\n* kept as is\n"));
}

#[test]
fn test_commit_links_in_changelog() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "fix: first", &[]);
    repo.set_remote_branch("main", root);

    let settings = ReleaseSettings {
        commit_url: Some("https://github.com/example/project/commit".to_string()),
        ..settings_on(1)
    };
    release(&repo, &settings, "v0").unwrap();

    assert!(changelog(&repo, "v0").contains(&format!(
        "- first ([{}](https://github.com/example/project/commit/{}))",
        short(root),
        root
    )));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_merge_conflict_leaves_line_untouched() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[("config.toml", "a = 1"), ("README.md", "hello")]);
    let line_tip = repo.commit(
        &[root],
        "fix: tune on v0",
        &[("config.toml", "a = 2"), ("README.md", "line")],
    );
    let main_tip = repo.commit(
        &[root],
        "feat: tune on main",
        &[("config.toml", "a = 3"), ("README.md", "main"), ("src/new.rs", "new")],
    );
    repo.set_remote_branch("v0", line_tip);
    repo.set_remote_branch("main", main_tip);

    let err = release(&repo, &settings_on(1), "v0").unwrap_err();
    match &err {
        ReleaseError::MergeConflict {
            line,
            source_ref,
            paths,
        } => {
            assert_eq!(line, "v0");
            assert_eq!(source_ref, "main");
            assert_eq!(paths, &vec!["README.md".to_string(), "config.toml".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        err.to_string(),
        "Merge conflict merging 'main' into 'v0' in: README.md, config.toml"
    );
    assert_eq!(repo.remote_branch("v0"), Some(line_tip));
    assert!(repo.remote_tags().is_empty());
    assert_eq!(repo.push_count(), 0);
}

#[test]
fn test_tag_already_exists_elsewhere() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    let elsewhere = repo.commit(&[], "chore: unrelated history", &[]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);
    repo.set_remote_tag("v0.1.0", elsewhere);

    let (attempt, result) = Orchestrator::new(&repo, &settings_on(1)).release_line("v0");
    match result.unwrap_err() {
        ReleaseError::TagAlreadyExists { line, tag, target } => {
            assert_eq!(line, "v0");
            assert_eq!(tag, "v0.1.0");
            assert_eq!(target, short(elsewhere));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(repo.remote_branch("v0"), Some(root));
    assert_eq!(repo.remote_tag("v0.1.0"), Some(elsewhere));
}

#[test]
fn test_unknown_source_is_history_unavailable() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    repo.set_remote_branch("v0", root);

    let settings = ReleaseSettings {
        source: "develop".to_string(),
        ..settings_on(1)
    };
    let err = release(&repo, &settings, "v0").unwrap_err();
    assert!(matches!(err, ReleaseError::HistoryUnavailable { reference } if reference == "develop"));
}

// ============================================================================
// Resume after partial pushes
// ============================================================================

#[test]
fn test_resume_when_tag_push_failed() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);
    repo.reject_push("refs/tags/v0.1.0");

    let err = release(&repo, &settings_on(1), "v0").unwrap_err();
    assert!(matches!(err, ReleaseError::PushRejected { .. }));
    let head = repo.remote_branch("v0").unwrap();
    assert_ne!(head, root);
    assert_eq!(repo.remote_tag("v0.1.0"), None);

    repo.allow_push("refs/tags/v0.1.0");
    let (attempt, result) = Orchestrator::new(&repo, &settings_on(2)).release_line("v0");
    assert_eq!(result.unwrap(), released(0, 1, 0, true));
    assert_eq!(attempt.status, AttemptStatus::Pushed);
    assert_eq!(repo.remote_branch("v0"), Some(head));
    assert_eq!(repo.remote_tag("v0.1.0"), Some(head));

    let outcome = release(&repo, &settings_on(2), "v0").unwrap();
    assert!(matches!(outcome, LineOutcome::Noop { .. }));
}

#[test]
fn test_resume_when_branch_push_failed() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);
    repo.reject_push("refs/heads/v0");

    let err = release(&repo, &settings_on(1), "v0").unwrap_err();
    assert!(matches!(err, ReleaseError::PushRejected { refs } if refs.len() == 1));
    assert_eq!(repo.remote_branch("v0"), Some(root));
    let tagged = repo.remote_tag("v0.1.0").unwrap();

    repo.allow_push("refs/heads/v0");
    let outcome = release(&repo, &settings_on(2), "v0").unwrap();
    assert_eq!(outcome, released(0, 1, 0, true));
    assert_eq!(repo.remote_branch("v0"), Some(tagged));

    let outcome = release(&repo, &settings_on(2), "v0").unwrap();
    assert!(matches!(outcome, LineOutcome::Noop { .. }));
}

#[test]
fn test_resume_new_line_when_branch_creation_failed() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "feat!: first public API", &[]);
    repo.set_remote_branch("main", root);
    repo.reject_push("refs/heads/v1");

    assert!(release(&repo, &settings_on(1), "v1").is_err());
    assert_eq!(repo.remote_branch("v1"), None);
    let tagged = repo.remote_tag("v1.0.0").unwrap();

    repo.allow_push("refs/heads/v1");
    let outcome = release(&repo, &settings_on(1), "v1").unwrap();
    assert_eq!(outcome, released(1, 0, 0, true));
    assert_eq!(repo.remote_branch("v1"), Some(tagged));
}

#[test]
fn test_pending_tag_taken_by_another_commit() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let head = repo.commit(&[root], "Update CHANGELOG for v0.3.0", &[]);
    let elsewhere = repo.commit(&[root], "chore: other", &[]);
    repo.set_remote_branch("main", root);
    repo.set_remote_branch("v0", head);
    repo.set_remote_tag("v0.3.0", elsewhere);

    let err = release(&repo, &settings_on(1), "v0").unwrap_err();
    assert!(matches!(err, ReleaseError::TagAlreadyExists { tag, .. } if tag == "v0.3.0"));
}

#[test]
fn test_other_line_release_is_not_taken_for_an_orphan() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[("a.txt", "a")]);
    repo.set_remote_branch("main", feat);
    release(&repo, &settings_on(1), "v0").unwrap();
    let v0_head = repo.remote_branch("v0").unwrap();

    // v0 is merged back into main before v1 is cut, so v1.0.0 descends from v0
    let back = repo.commit(&[feat, v0_head], "Merge `v0` into `main`", &[]);
    let breaking = repo.commit(&[back], "feat!: new API", &[("a.txt", "b")]);
    repo.set_remote_branch("main", breaking);
    assert_eq!(release(&repo, &settings_on(2), "v1").unwrap(), released(1, 0, 0, false));

    let result = release(&repo, &settings_on(3), "v0");
    assert_ne!(result.ok(), Some(released(1, 0, 0, true)));
    assert_eq!(repo.remote_branch("v0"), Some(v0_head));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_conflict_is_retried_once_with_fresh_read() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[("feature.txt", "on")]);
    let hotfix = repo.commit(&[root], "fix: hotfix on v0", &[("hot.txt", "1")]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);
    // Someone pushes to v0 between our read and our push
    repo.schedule_remote_move(1, "v0", hotfix);

    let outcome = release(&repo, &settings_on(1), "v0").unwrap();
    assert_eq!(outcome, released(0, 1, 0, false));

    let head = repo.remote_branch("v0").unwrap();
    let merge = repo.parents_of(head)[0];
    assert_eq!(repo.parents_of(merge), vec![hotfix, feat]);
    assert_eq!(repo.file_at(head, "hot.txt").as_deref(), Some("1"));
    assert_eq!(repo.file_at(head, "feature.txt").as_deref(), Some("on"));
    assert_eq!(repo.fetch_count(), 2);
}

#[test]
fn test_second_conflict_is_fatal() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    let hotfix = repo.commit(&[root], "fix: hotfix", &[("hot.txt", "1")]);
    let hotfix2 = repo.commit(&[hotfix], "fix: another hotfix", &[("hot.txt", "2")]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);
    repo.schedule_remote_move(1, "v0", hotfix);
    repo.schedule_remote_move(3, "v0", hotfix2);

    let err = release(&repo, &settings_on(1), "v0").unwrap_err();
    match err {
        ReleaseError::Conflict {
            reference,
            expected,
            found,
        } => {
            assert_eq!(reference, "refs/heads/v0");
            assert_eq!(expected, short(hotfix));
            assert_eq!(found, short(hotfix2));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(repo.remote_branch("v0"), Some(hotfix2));
    assert!(repo.remote_tags().is_empty());
}

#[test]
fn test_dry_run_touches_nothing() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);

    let settings = ReleaseSettings {
        dry_run: true,
        ..settings_on(1)
    };
    let (attempt, result) = Orchestrator::new(&repo, &settings).release_line("v0");

    assert_eq!(
        result.unwrap(),
        LineOutcome::DryRun {
            version: Version::new(0, 1, 0),
            tag: "v0.1.0".to_string(),
        }
    );
    assert_eq!(attempt.status, AttemptStatus::Changelogged);
    assert!(attempt.changelog_commit.is_some());
    assert_eq!(repo.remote_branch("v0"), Some(root));
    assert!(repo.remote_tags().is_empty());
    assert_eq!(repo.local_tag("v0.1.0"), None);
    assert_eq!(repo.push_count(), 0);
}

// ============================================================================
// Runner
// ============================================================================

#[test]
fn test_runner_isolates_line_failures() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[("config.toml", "a = 1")]);
    let line_tip = repo.commit(&[root], "fix: on v0", &[("config.toml", "a = 2")]);
    let main_tip = repo.commit(&[root], "feat!: on main", &[("config.toml", "a = 3")]);
    repo.set_remote_branch("v0", line_tip);
    repo.set_remote_branch("main", main_tip);

    let runner = ReleaseRunner::new(settings_on(1));
    let request = ReleaseRequest {
        lines: vec!["v0".to_string(), "v1".to_string()],
    };
    let report = runner.run(|| Ok(repo.clone()), &request).unwrap();

    let lines: Vec<&str> = report.lines.iter().map(|l| l.line.as_str()).collect();
    assert_eq!(lines, vec!["v0", "v1"]);
    assert_eq!(
        report.line("v0").unwrap().summary(),
        "v0: failed: Merge conflict merging 'main' into 'v0' in: config.toml"
    );
    assert_eq!(report.line("v1").unwrap().summary(), "v1: released 1.0.0");
    assert_eq!(report.exit_code(), 1);
    assert_eq!(repo.remote_branch("v0"), Some(line_tip));
}

#[test]
fn test_runner_serializes_duplicate_lines() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let feat = repo.commit(&[root], "feat: thing", &[]);
    repo.set_remote_branch("v0", root);
    repo.set_remote_branch("main", feat);

    let runner = ReleaseRunner::new(settings_on(1));
    let request = ReleaseRequest {
        lines: vec!["v0".to_string(), "v0".to_string()],
    };
    let report = runner.run(|| Ok(repo.clone()), &request).unwrap();

    let mut summaries: Vec<String> = report.lines.iter().map(|l| l.summary()).collect();
    summaries.sort();
    assert_eq!(summaries, vec!["v0: noop", "v0: released 0.1.0"]);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(repo.remote_tags(), vec!["v0.1.0".to_string()]);
}

#[test]
fn test_runner_defaults_to_latest_line() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "chore: init", &[]);
    let fix = repo.commit(&[root], "fix: thing", &[]);
    repo.set_remote_branch("main", fix);
    repo.set_remote_branch("v2", root);
    repo.set_remote_branch("v10", root);
    repo.set_remote_branch("v9", root);
    repo.set_remote_tag("v10.0.0", root);

    let runner = ReleaseRunner::new(settings_on(1));
    let report = runner
        .run(|| Ok(repo.clone()), &ReleaseRequest::default())
        .unwrap();

    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].summary(), "v10: released 10.0.1");
    assert_eq!(repo.remote_branch("v9"), Some(root));
}

#[test]
fn test_runner_defaults_to_v0_without_release_branches() {
    let repo = MockRepository::new();
    let root = repo.commit(&[], "feat: first", &[]);
    repo.set_remote_branch("main", root);

    let runner = ReleaseRunner::new(settings_on(1));
    let report = runner
        .run(|| Ok(repo.clone()), &ReleaseRequest::default())
        .unwrap();

    assert_eq!(report.lines[0].summary(), "v0: released 0.1.0");
    let attempt = report.lines[0].attempt.as_ref().unwrap();
    assert_eq!(attempt.warnings.len(), 1);
}

#[test]
fn test_runner_reports_open_failures_per_line() {
    let runner = ReleaseRunner::new(settings_on(1));
    let request = ReleaseRequest {
        lines: vec!["v0".to_string()],
    };
    let report = runner
        .run(
            || -> Result<MockRepository> { Err(ReleaseError::remote("offline")) },
            &request,
        )
        .unwrap();

    assert!(report.lines[0].attempt.is_none());
    assert_eq!(
        report.lines[0].summary(),
        "v0: failed: Remote operation failed: offline"
    );
    assert_eq!(report.exit_code(), 1);
}
