use std::fmt;
use std::sync::OnceLock;

use git2::Oid;
use regex::Regex;

use crate::config::ConventionalCommitsConfig;
use crate::domain::VersionBump;

/// A commit as read from the repository graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: Oid,
    pub message: String,
    pub parents: Vec<Oid>,
}

impl Commit {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message, trimmed
    pub fn header(&self) -> &str {
        first_line(&self.message)
    }
}

/// Release-relevant category of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Breaking,
    Feature,
    Fix,
    Other,
}

impl Category {
    /// Categories in changelog section order
    pub const ALL: [Category; 4] = [
        Category::Breaking,
        Category::Feature,
        Category::Fix,
        Category::Other,
    ];

    /// The version bump this category implies, if any
    pub fn bump(&self) -> Option<VersionBump> {
        match self {
            Category::Breaking => Some(VersionBump::Major),
            Category::Feature => Some(VersionBump::Minor),
            Category::Fix => Some(VersionBump::Patch),
            Category::Other => None,
        }
    }

    /// Changelog group heading
    pub fn title(&self) -> &'static str {
        match self {
            Category::Breaking => "Breaking Changes",
            Category::Feature => "Features",
            Category::Fix => "Fixes",
            Category::Other => "Other",
        }
    }

    pub fn from_title(title: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.title() == title.trim())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A commit mapped onto the conventional-commit categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCommit {
    /// Originating commit, absent when a bare message was classified
    pub hash: Option<Oid>,
    pub category: Category,
    /// Lowercase type token of the header (`feat`, `docs`, ...), absent for malformed headers
    pub kind: Option<String>,
    pub scope: Option<String>,
    pub summary: String,
    pub is_merge_commit: bool,
}

impl ClassifiedCommit {
    /// First 7 hex characters of the commit hash
    pub fn short_hash(&self) -> Option<String> {
        self.hash.map(|oid| oid.to_string()[..7].to_string())
    }
}

fn header_regex() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9-]*)(?:\(([^()\n]+)\))?(!)?:\s+(\S.*)$").ok())
        .as_ref()
}

/// First non-blank line; leading whitespace is kept so an indented type does not match
fn first_line(message: &str) -> &str {
    message
        .lines()
        .map(str::trim_end)
        .find(|line| !line.trim_start().is_empty())
        .unwrap_or("")
}

/// Conventional-commit classifier
///
/// Grammar of the header (first non-blank line):
///
/// ```text
/// header  = type [ "(" scope ")" ] [ "!" ] ":" 1*SP summary
/// type    = ALPHA *( ALPHA / DIGIT / "-" )
/// scope   = 1*( any char except "(" / ")" / LF )
/// ```
///
/// Any later line starting with one of the breaking change indicators
/// (`BREAKING CHANGE:` / `BREAKING-CHANGE:` by default) marks the commit as
/// breaking, whether or not the header parsed.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ConventionalCommitsConfig,
}

impl Classifier {
    pub fn new(config: ConventionalCommitsConfig) -> Self {
        Classifier { config }
    }

    /// Classify a raw commit message. Never fails: malformed input degrades
    /// to [`Category::Other`] with the first line as summary.
    pub fn classify(&self, message: &str) -> ClassifiedCommit {
        let header = first_line(message);
        let has_breaking_footer = self.has_breaking_footer(message, header);

        let Some(captures) = header_regex().and_then(|re| re.captures(header)) else {
            return ClassifiedCommit {
                hash: None,
                category: if has_breaking_footer {
                    Category::Breaking
                } else {
                    Category::Other
                },
                kind: None,
                scope: None,
                summary: header.trim().to_string(),
                is_merge_commit: false,
            };
        };

        let kind = captures[1].to_lowercase();
        let scope = captures.get(2).map(|m| m.as_str().trim().to_string());
        let has_marker = captures.get(3).is_some();
        let summary = captures[4].trim().to_string();

        let category = if has_marker || has_breaking_footer {
            Category::Breaking
        } else if self.config.feature_types.iter().any(|t| *t == kind) {
            Category::Feature
        } else if self.config.fix_types.iter().any(|t| *t == kind) {
            Category::Fix
        } else {
            Category::Other
        };

        ClassifiedCommit {
            hash: None,
            category,
            kind: Some(kind),
            scope: scope.filter(|s| !s.is_empty()),
            summary,
            is_merge_commit: false,
        }
    }

    /// Classify a commit from the graph, keeping its hash and merge flag
    pub fn classify_commit(&self, commit: &Commit) -> ClassifiedCommit {
        ClassifiedCommit {
            hash: Some(commit.hash),
            is_merge_commit: commit.is_merge(),
            ..self.classify(&commit.message)
        }
    }

    /// Whether the header follows the grammar
    pub fn is_conventional(&self, message: &str) -> bool {
        header_regex().is_some_and(|re| re.is_match(first_line(message)))
    }

    fn has_breaking_footer(&self, message: &str, header: &str) -> bool {
        message
            .lines()
            .map(str::trim_start)
            .skip_while(|line| line.trim().is_empty())
            .skip(usize::from(!header.is_empty()))
            .any(|line| {
                self.config
                    .breaking_change_indicators
                    .iter()
                    .any(|indicator| line.starts_with(indicator.as_str()))
            })
    }
}

/// Classify a message with the default type mapping (`feat`, `fix`)
pub fn classify(message: &str) -> ClassifiedCommit {
    Classifier::default().classify(message)
}
