use git2::Oid;

use crate::domain::Version;

/// The most recent release tag on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTag {
    pub name: String,
    pub version: Version,
    pub target: Oid,
}

/// A long-lived release branch (e.g. `v0`) as currently seen on the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLine {
    pub name: String,
    /// Highest-versioned release tag reachable from `head`
    pub last_tag: Option<LineTag>,
    /// Tip of the branch; `None` until the branch exists on the remote
    pub head: Option<Oid>,
}

impl ReleaseLine {
    pub fn new(name: impl Into<String>, head: Option<Oid>) -> Self {
        ReleaseLine {
            name: name.into(),
            last_tag: None,
            head,
        }
    }

    pub fn exists(&self) -> bool {
        self.head.is_some()
    }

    pub fn last_version(&self) -> Option<Version> {
        self.last_tag.as_ref().map(|tag| tag.version)
    }

    /// Major number encoded in a `vN` branch name
    pub fn major_number(&self) -> Option<u64> {
        parse_line_number(&self.name)
    }
}

/// Parse the number out of a `vN` release branch name
pub fn parse_line_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('v')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Pick the highest `vN` branch from a list of branch names
pub fn latest_line<'a, I>(branches: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    branches
        .into_iter()
        .filter_map(|name| parse_line_number(name).map(|n| (n, name)))
        .max_by_key(|(n, _)| *n)
        .map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_line_does_not_exist() {
        let line = ReleaseLine::new("v1", None);
        assert!(!line.exists());
        assert_eq!(line.last_version(), None);
        assert_eq!(line.major_number(), Some(1));
    }

    #[test]
    fn test_parse_line_number() {
        assert_eq!(parse_line_number("v0"), Some(0));
        assert_eq!(parse_line_number("v12"), Some(12));
        assert_eq!(parse_line_number("v"), None);
        assert_eq!(parse_line_number("v1.0"), None);
        assert_eq!(parse_line_number("main"), None);
    }

    #[test]
    fn test_latest_line_sorts_numerically() {
        let branches = ["main", "v2", "v10", "v9", "feature/v11x"];
        assert_eq!(latest_line(branches), Some("v10"));
        assert_eq!(latest_line(["main", "develop"]), None);
    }
}
