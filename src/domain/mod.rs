//! Domain logic - pure business rules independent of git operations

pub mod branch;
pub mod commit;
pub mod tag;
pub mod version;

pub use branch::{LineTag, ReleaseLine};
pub use commit::{classify, Category, ClassifiedCommit, Classifier, Commit};
pub use tag::TagPattern;
pub use version::{Version, VersionBump};
