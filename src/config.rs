use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::TagPattern;
use crate::error::{ReleaseError, Result};

const CONFIG_FILE_NAME: &str = "releaser.toml";

/// Represents the complete configuration for releaser.
///
/// Contains release line settings, changelog rendering options, the committer
/// identity used for generated commits and the conventional commit mapping.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub changelog: ChangelogConfig,

    #[serde(default)]
    pub committer: CommitterConfig,

    #[serde(default)]
    pub conventional_commits: ConventionalCommitsConfig,
}

fn default_source() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_tag_pattern() -> String {
    "v{version}".to_string()
}

fn default_changelog_path() -> String {
    "CHANGELOG.md".to_string()
}

/// Where releases come from and where they go.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReleaseConfig {
    /// Branch whose commits are released
    #[serde(default = "default_source")]
    pub source: String,

    /// Release lines to advance; empty means the highest `vN` branch on the remote
    #[serde(default)]
    pub lines: Vec<String>,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,

    /// Changelog file, relative to the repository root
    #[serde(default = "default_changelog_path")]
    pub changelog_path: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        ReleaseConfig {
            source: default_source(),
            lines: Vec::new(),
            remote: default_remote(),
            tag_pattern: default_tag_pattern(),
            changelog_path: default_changelog_path(),
        }
    }
}

impl ReleaseConfig {
    pub fn tag_pattern(&self) -> Result<TagPattern> {
        TagPattern::new(&self.tag_pattern)
    }
}

/// Changelog rendering options.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ChangelogConfig {
    /// Base URL for commit links, e.g. `https://github.com/org/repo/commit`
    #[serde(default)]
    pub commit_url: Option<String>,
}

fn default_committer_name() -> String {
    "releaser".to_string()
}

fn default_committer_email() -> String {
    "releaser@localhost".to_string()
}

/// Identity used for merge commits, changelog commits and annotated tags.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CommitterConfig {
    #[serde(default = "default_committer_name")]
    pub name: String,

    #[serde(default = "default_committer_email")]
    pub email: String,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        CommitterConfig {
            name: default_committer_name(),
            email: default_committer_email(),
        }
    }
}

fn default_feature_types() -> Vec<String> {
    vec!["feat".to_string()]
}

fn default_fix_types() -> Vec<String> {
    vec!["fix".to_string()]
}

/// Returns the default list of breaking change indicators.
fn default_breaking_change_indicators() -> Vec<String> {
    vec![
        "BREAKING CHANGE:".to_string(),
        "BREAKING-CHANGE:".to_string(),
    ]
}

/// Configuration for conventional commit analysis.
///
/// Maps commit types onto release categories. Types in neither list are
/// classified as "other" and never trigger a release on their own.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConventionalCommitsConfig {
    #[serde(default = "default_feature_types")]
    pub feature_types: Vec<String>,

    #[serde(default = "default_fix_types")]
    pub fix_types: Vec<String>,

    #[serde(default = "default_breaking_change_indicators")]
    pub breaking_change_indicators: Vec<String>,
}

impl Default for ConventionalCommitsConfig {
    fn default() -> Self {
        ConventionalCommitsConfig {
            feature_types: default_feature_types(),
            fix_types: default_fix_types(),
            breaking_change_indicators: default_breaking_change_indicators(),
        }
    }
}

impl Config {
    /// Checks values that serde cannot: the tag pattern and the changelog path.
    pub fn validate(&self) -> Result<()> {
        self.release.tag_pattern()?;

        let path = Path::new(&self.release.changelog_path);
        if self.release.changelog_path.trim().is_empty()
            || path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ReleaseError::config(format!(
                "changelog_path '{}' must be a relative path inside the repository",
                self.release.changelog_path
            )));
        }

        Ok(())
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `releaser.toml` in current directory
/// 3. `.releaser.toml` in user config directory
/// 4. Default configuration if no file found
///
/// # Arguments
/// * `config_path` - Optional path to custom configuration file
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read, parsed or validated
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        fs::read_to_string(path)?
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        fs::read_to_string(CONFIG_FILE_NAME)?
    } else if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if config_path.exists() {
            fs::read_to_string(config_path)?
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    let config: Config =
        toml::from_str(&config_str).map_err(|e| ReleaseError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
