//! Analysis engine: history walking, version resolution and commit linting

pub mod check;
pub mod history;
pub mod version_analyzer;

pub use check::{check_range, CheckReport};
pub use history::{commits_between, resolve_ref};
pub use version_analyzer::{max_bump, resolve, VersionAnalyzer, VersionDecision};
