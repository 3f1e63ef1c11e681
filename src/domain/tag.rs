use crate::domain::Version;
use crate::error::{ReleaseError, Result};

const VERSION_PLACEHOLDER: &str = "{version}";

/// Tag naming pattern (e.g., "v{version}", "release-{version}")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    prefix: String,
    suffix: String,
}

impl TagPattern {
    /// Create a new tag pattern
    ///
    /// The pattern must contain exactly one `{version}` placeholder.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut parts = pattern.split(VERSION_PLACEHOLDER);
        let prefix = parts.next().unwrap_or_default();
        let suffix = parts.next().ok_or_else(|| {
            ReleaseError::tag(format!(
                "Pattern '{}' must contain {{version}} placeholder",
                pattern
            ))
        })?;

        if parts.next().is_some() {
            return Err(ReleaseError::tag(format!(
                "Pattern '{}' contains more than one {{version}} placeholder",
                pattern
            )));
        }

        Ok(TagPattern {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Format a version according to pattern
    /// Example: pattern="v{version}", version=1.2.3 -> "v1.2.3"
    pub fn format(&self, version: &Version) -> String {
        format!("{}{}{}", self.prefix, version, self.suffix)
    }

    /// Extract the version from a tag name, if the tag follows this pattern
    pub fn parse(&self, tag: &str) -> Option<Version> {
        let inner = tag
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        Version::parse(inner).ok()
    }

    /// Whether the tag shares this pattern's fixed prefix and suffix, even
    /// when the version part does not parse
    pub fn resembles(&self, tag: &str) -> bool {
        tag.len() > self.prefix.len() + self.suffix.len()
            && tag.starts_with(self.prefix.as_str())
            && tag.ends_with(self.suffix.as_str())
    }
}

impl Default for TagPattern {
    fn default() -> Self {
        TagPattern {
            prefix: "v".to_string(),
            suffix: String::new(),
        }
    }
}
