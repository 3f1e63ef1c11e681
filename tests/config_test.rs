// tests/config_test.rs
use std::env;
use std::fs;
use std::io::Write;

use releaser::config::{load_config, Config};
use releaser::domain::Version;
use releaser::ReleaseError;
use serial_test::serial;
use tempfile::{NamedTempFile, TempDir};

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_load_default_config() {
    let config = Config::default();
    assert_eq!(config.release.source, "main");
    assert!(config.release.lines.is_empty());
    assert_eq!(config.release.remote, "origin");
    assert_eq!(config.release.tag_pattern, "v{version}");
    assert_eq!(config.release.changelog_path, "CHANGELOG.md");
    assert_eq!(config.changelog.commit_url, None);
    assert!(config
        .conventional_commits
        .breaking_change_indicators
        .contains(&"BREAKING CHANGE:".to_string()));
}

#[test]
fn test_load_full_fixture() {
    let config = load_config(Some(&fixture("full.toml"))).unwrap();

    assert_eq!(config.release.source, "develop");
    assert_eq!(config.release.lines, vec!["v1", "v2"]);
    assert_eq!(config.release.remote, "upstream");
    assert_eq!(config.release.changelog_path, "docs/CHANGELOG.md");
    assert_eq!(
        config.changelog.commit_url.as_deref(),
        Some("https://github.com/example/project/commit")
    );
    assert_eq!(config.committer.name, "Release Bot");
    assert_eq!(
        config.conventional_commits.fix_types,
        vec!["fix".to_string(), "perf".to_string()]
    );

    let pattern = config.release.tag_pattern().unwrap();
    assert_eq!(pattern.format(&Version::new(1, 2, 3)), "release-1.2.3");
}

#[test]
fn test_invalid_tag_pattern_is_rejected() {
    let err = load_config(Some(&fixture("bad_pattern.toml"))).unwrap_err();
    assert!(matches!(err, ReleaseError::Tag(_)), "got: {}", err);
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[release\nsource = ").unwrap();
    temp_file.flush().unwrap();

    let err = load_config(Some(temp_file.path().to_str().unwrap())).unwrap_err();
    assert!(matches!(err, ReleaseError::Config(_)), "got: {}", err);
}

#[test]
fn test_missing_explicit_file_is_an_io_error() {
    let err = load_config(Some(&fixture("does-not-exist.toml"))).unwrap_err();
    assert!(matches!(err, ReleaseError::Io(_)), "got: {}", err);
}

#[test]
#[serial]
fn test_config_in_current_directory_is_picked_up() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("releaser.toml"),
        "[release]\nsource = \"trunk\"\n",
    )
    .unwrap();

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let loaded = load_config(None);
    env::set_current_dir(previous).unwrap();

    assert_eq!(loaded.unwrap().release.source, "trunk");
}

#[test]
#[serial]
fn test_empty_directory_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let loaded = load_config(None);
    env::set_current_dir(previous).unwrap();

    // A user-level config may exist on the machine running the tests
    assert!(loaded.is_ok());
}
