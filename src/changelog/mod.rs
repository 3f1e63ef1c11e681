//! Markdown changelog rendering and parsing
//!
//! A changelog is a preamble followed by version sections, newest first:
//!
//! ```text
//! # Changelog
//!
//! ## v0.1.0 (2024-08-01)
//!
//! ### Features
//!
//! - **scope1**: add a new feature (abc1234)
//! ```
//!
//! Sections are keyed by the version found in their heading. Rendering a
//! version that already has a section leaves the document untouched, and
//! sections this tool did not write are carried over as they are.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::analyzer::VersionDecision;
use crate::domain::{Category, ClassifiedCommit, TagPattern, Version};

const DEFAULT_PREAMBLE: &str = "# Changelog";

/// One version section, kept as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading text after `## `
    pub heading: String,
    /// Version found in the heading, if any
    pub version: Option<Version>,
    /// Everything between this heading and the next, without surrounding blank lines
    pub body: String,
}

/// One bullet of a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub scope: Option<String>,
    pub summary: String,
    pub short_hash: Option<String>,
}

impl From<&ClassifiedCommit> for Entry {
    fn from(commit: &ClassifiedCommit) -> Self {
        Entry {
            scope: commit.scope.clone(),
            summary: commit.summary.clone(),
            short_hash: commit.short_hash(),
        }
    }
}

fn version_regex() -> Option<&'static Regex> {
    static VERSION: OnceLock<Option<Regex>> = OnceLock::new();
    VERSION
        .get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").ok())
        .as_ref()
}

fn entry_regex() -> Option<&'static Regex> {
    static ENTRY: OnceLock<Option<Regex>> = OnceLock::new();
    ENTRY
        .get_or_init(|| {
            Regex::new(
                r"^- (?:\*\*(?P<scope>[^*]+)\*\*: )?(?P<summary>.*?)(?: \((?:\[(?P<linked>[0-9a-f]{7})\]\([^)\s]*\)|(?P<hash>[0-9a-f]{7}))\))?$",
            )
            .ok()
        })
        .as_ref()
}

fn unescape_summary(summary: &str) -> String {
    match summary.strip_prefix('\\') {
        Some(rest) if rest.starts_with("**") => rest.to_string(),
        _ => summary.to_string(),
    }
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

impl Section {
    fn from_parts(heading: &str, body: &[&str]) -> Self {
        let heading = heading.trim().to_string();
        let version = version_regex()
            .and_then(|re| re.find(&heading))
            .and_then(|m| Version::parse(m.as_str()).ok());

        Section {
            heading,
            version,
            body: trim_blank_lines(body),
        }
    }

    /// Entries grouped under their `###` category headings, in document order
    ///
    /// Bullets under unknown group headings are skipped.
    pub fn entries(&self) -> Vec<(Category, Vec<Entry>)> {
        let mut groups: Vec<(Category, Vec<Entry>)> = Vec::new();
        let mut current: Option<Category> = None;

        for line in self.body.lines() {
            if let Some(title) = line.strip_prefix("### ") {
                current = Category::from_title(title);
                if let Some(category) = current {
                    groups.push((category, Vec::new()));
                }
                continue;
            }

            if current.is_none() {
                continue;
            }
            let Some(captures) = entry_regex().and_then(|re| re.captures(line.trim_end())) else {
                continue;
            };
            let entry = Entry {
                scope: captures.name("scope").map(|m| m.as_str().to_string()),
                summary: unescape_summary(&captures["summary"]),
                short_hash: captures
                    .name("linked")
                    .or_else(|| captures.name("hash"))
                    .map(|m| m.as_str().to_string()),
            };
            if let Some((_, entries)) = groups.last_mut() {
                entries.push(entry);
            }
        }

        groups
    }
}

/// A parsed changelog file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogDocument {
    /// Text before the first section
    pub preamble: String,
    /// Most recent first
    pub sections: Vec<Section>,
}

impl Default for ChangelogDocument {
    fn default() -> Self {
        ChangelogDocument {
            preamble: DEFAULT_PREAMBLE.to_string(),
            sections: Vec::new(),
        }
    }
}

impl ChangelogDocument {
    /// Split Markdown text into preamble and `## ` sections
    ///
    /// Lines inside fenced code blocks never start a section.
    pub fn parse(text: &str) -> Self {
        let mut preamble: Vec<&str> = Vec::new();
        let mut sections = Vec::new();
        let mut current: Option<(&str, Vec<&str>)> = None;
        let mut in_fence = false;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }

            match line.strip_prefix("## ") {
                Some(heading) if !in_fence => {
                    if let Some((heading, body)) = current.take() {
                        sections.push(Section::from_parts(heading, &body));
                    }
                    current = Some((heading, Vec::new()));
                }
                _ => match current.as_mut() {
                    Some((_, body)) => body.push(line),
                    None => preamble.push(line),
                },
            }
        }

        if let Some((heading, body)) = current {
            sections.push(Section::from_parts(heading, &body));
        }

        ChangelogDocument {
            preamble: trim_blank_lines(&preamble),
            sections,
        }
    }

    pub fn section(&self, version: &Version) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.version.as_ref() == Some(version))
    }

    pub fn to_markdown(&self) -> String {
        let mut blocks = Vec::new();
        if !self.preamble.is_empty() {
            blocks.push(self.preamble.clone());
        }

        for section in &self.sections {
            if section.body.is_empty() {
                blocks.push(format!("## {}", section.heading));
            } else {
                blocks.push(format!("## {}\n\n{}", section.heading, section.body));
            }
        }

        let mut markdown = blocks.join("\n\n");
        markdown.push('\n');
        markdown
    }
}

/// Commits grouped by category in section order, empty groups omitted
pub fn group_commits(commits: &[ClassifiedCommit]) -> Vec<(Category, Vec<&ClassifiedCommit>)> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let members: Vec<&ClassifiedCommit> =
                commits.iter().filter(|c| c.category == category).collect();
            (category, members)
        })
        .filter(|(_, members)| !members.is_empty())
        .collect()
}

/// Renders release sections into changelog documents
#[derive(Debug, Clone)]
pub struct ChangelogGenerator {
    tag_pattern: TagPattern,
    date: NaiveDate,
    commit_url: Option<String>,
}

impl ChangelogGenerator {
    pub fn new(tag_pattern: TagPattern, date: NaiveDate) -> Self {
        ChangelogGenerator {
            tag_pattern,
            date,
            commit_url: None,
        }
    }

    /// Link short hashes to `<base>/<full hash>`
    pub fn with_commit_url(mut self, base: Option<String>) -> Self {
        self.commit_url = base
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        self
    }

    /// Prepend the section for a release decision
    ///
    /// The document comes back unchanged when no release is needed or when
    /// the version already has a section.
    pub fn render(&self, decision: &VersionDecision, existing: &ChangelogDocument) -> ChangelogDocument {
        let VersionDecision::Release {
            version, commits, ..
        } = decision
        else {
            return existing.clone();
        };

        if existing.section(version).is_some() {
            return existing.clone();
        }

        let mut document = existing.clone();
        document.sections.insert(0, self.section(version, commits));
        document
    }

    fn section(&self, version: &Version, commits: &[ClassifiedCommit]) -> Section {
        let groups: Vec<String> = group_commits(commits)
            .into_iter()
            .map(|(category, members)| {
                let lines: Vec<String> = members.iter().map(|c| self.entry_line(c)).collect();
                format!("### {}\n\n{}", category.title(), lines.join("\n"))
            })
            .collect();

        Section {
            heading: format!(
                "{} ({})",
                self.tag_pattern.format(version),
                self.date.format("%Y-%m-%d")
            ),
            version: Some(*version),
            body: groups.join("\n\n"),
        }
    }

    fn entry_line(&self, commit: &ClassifiedCommit) -> String {
        let mut line = String::from("- ");
        match &commit.scope {
            Some(scope) => line.push_str(&format!("**{}**: ", scope)),
            // an unscoped summary must not read back as a scope
            None if commit.summary.starts_with("**") => line.push('\\'),
            None => {}
        }
        line.push_str(&commit.summary);

        if let (Some(hash), Some(short)) = (commit.hash, commit.short_hash()) {
            match &self.commit_url {
                Some(base) => line.push_str(&format!(" ([{}]({}/{}))", short, base, hash)),
                None => line.push_str(&format!(" ({})", short)),
            }
        }

        line
    }
}

#[cfg(test)]
mod tests {
    use git2::Oid;

    use super::*;
    use crate::analyzer::resolve;
    use crate::domain::Classifier;

    fn oid(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).unwrap()
    }

    fn commit(n: u8, message: &str) -> ClassifiedCommit {
        ClassifiedCommit {
            hash: Some(oid(n)),
            ..Classifier::default().classify(message)
        }
    }

    fn generator() -> ChangelogGenerator {
        ChangelogGenerator::new(
            TagPattern::default(),
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
        )
    }

    fn decision(commits: Vec<ClassifiedCommit>, last: Option<Version>) -> VersionDecision {
        resolve(commits, last).unwrap()
    }

    #[test]
    fn test_render_section_format() {
        let decision = decision(vec![commit(0xab, "feat(scope1): add a new feature")], None);
        let document = generator().render(&decision, &ChangelogDocument::default());

        assert_eq!(
            document.to_markdown(),
            "# Changelog\n\n## v0.1.0 (2024-08-01)\n\n### Features\n\n- **scope1**: add a new feature (abababa)\n"
        );
    }

    #[test]
    fn test_groups_in_fixed_order_and_empty_groups_omitted() {
        let decision = decision(
            vec![
                commit(1, "fix: b"),
                commit(2, "docs: c"),
                commit(3, "feat!: a"),
                commit(4, "fix(core): d"),
            ],
            Some(Version::new(1, 4, 2)),
        );
        let document = generator().render(&decision, &ChangelogDocument::default());
        let body = &document.sections[0].body;

        let breaking = body.find("### Breaking Changes").unwrap();
        let fixes = body.find("### Fixes").unwrap();
        let other = body.find("### Other").unwrap();
        assert!(breaking < fixes && fixes < other);
        assert!(!body.contains("### Features"));
        assert!(body.find("- b (").unwrap() < body.find("- **core**: d (").unwrap());
        assert_eq!(document.sections[0].heading, "v2.0.0 (2024-08-01)");
    }

    #[test]
    fn test_render_is_idempotent() {
        let decision = decision(vec![commit(1, "fix: repair")], Some(Version::new(0, 1, 0)));
        let once = generator().render(&decision, &ChangelogDocument::default());
        let twice = generator().render(&decision, &once);
        assert_eq!(once, twice);

        let reparsed = ChangelogDocument::parse(&once.to_markdown());
        assert_eq!(generator().render(&decision, &reparsed), reparsed);
    }

    #[test]
    fn test_no_release_leaves_document_unchanged() {
        let existing = ChangelogDocument::parse("# Changelog\n\n## v0.1.0 (2024-08-01)\n\nbody\n");
        let decision = decision(vec![commit(1, "docs: only docs")], None);
        assert!(!decision.is_release());
        assert_eq!(generator().render(&decision, &existing), existing);
    }

    #[test]
    fn test_prior_sections_are_preserved_verbatim() {
        let text = "# Changelog\n\nAll notable changes.\n\n## [0.1.0] - 2023-01-01\n\n* hand written\n  with odd formatting\n\n## Unreleased ideas\n\n```\n## not a heading\n```\n";
        let existing = ChangelogDocument::parse(text);
        assert_eq!(existing.sections.len(), 2);
        assert_eq!(existing.sections[0].version, Some(Version::new(0, 1, 0)));
        assert_eq!(existing.sections[1].version, None);
        assert!(existing.sections[1].body.contains("## not a heading"));

        let decision = decision(vec![commit(7, "feat: more")], Some(Version::new(0, 1, 0)));
        let rendered = generator().render(&decision, &existing);

        assert_eq!(rendered.preamble, "# Changelog\n\nAll notable changes.");
        assert_eq!(rendered.sections.len(), 3);
        assert_eq!(rendered.sections[0].version, Some(Version::new(0, 2, 0)));
        assert_eq!(&rendered.sections[1..], &existing.sections[..]);
        assert!(rendered.to_markdown().ends_with(text.trim_start_matches("# Changelog\n\nAll notable changes.\n\n")));
    }

    #[test]
    fn test_rendered_section_parses_back_to_entries() {
        let commits = vec![
            commit(1, "feat(api): add endpoint (v2)"),
            commit(2, "fix: handle null"),
            commit(3, "chore(deps): bump"),
            commit(4, "Random message"),
            commit(5, "docs: **bold**: not a scope"),
        ];
        let decision = decision(commits.clone(), None);

        for generator in [
            generator(),
            generator().with_commit_url(Some("https://example.com/repo/commit/".to_string())),
        ] {
            let markdown = generator.render(&decision, &ChangelogDocument::default()).to_markdown();
            let parsed = ChangelogDocument::parse(&markdown);

            let expected: Vec<(Category, Vec<Entry>)> = group_commits(&commits)
                .into_iter()
                .map(|(category, members)| (category, members.into_iter().map(Entry::from).collect()))
                .collect();
            assert_eq!(parsed.sections[0].entries(), expected);
        }
    }

    #[test]
    fn test_unscoped_summary_with_bold_prefix_is_escaped() {
        let decision = decision(vec![commit(6, "fix: **x**: keep me")], None);
        let markdown = generator()
            .render(&decision, &ChangelogDocument::default())
            .to_markdown();
        assert!(markdown.contains("- \\**x**: keep me (0606060)"));

        let entries = ChangelogDocument::parse(&markdown).sections[0].entries();
        assert_eq!(
            entries,
            vec![(
                Category::Fix,
                vec![Entry {
                    scope: None,
                    summary: "**x**: keep me".to_string(),
                    short_hash: Some("0606060".to_string()),
                }]
            )]
        );
    }

    #[test]
    fn test_commit_url_links_full_hash() {
        let decision = decision(vec![commit(0xcd, "fix: link me")], None);
        let document = generator()
            .with_commit_url(Some("https://github.com/org/repo/commit".to_string()))
            .render(&decision, &ChangelogDocument::default());

        assert!(document.sections[0].body.contains(&format!(
            "- link me ([cdcdcdc](https://github.com/org/repo/commit/{}))",
            oid(0xcd)
        )));
    }

    #[test]
    fn test_parse_empty_text() {
        let document = ChangelogDocument::parse("");
        assert_eq!(document.preamble, "");
        assert!(document.sections.is_empty());
        assert_eq!(ChangelogDocument::default().to_markdown(), "# Changelog\n");
    }
}
