//! Parses the CMS `requiredFiles` document, diffs it against the content
//! store, and resolves layout XLFs into the media they reference
//! (spec.md §4.2).

mod error;
mod resolver;
mod xlf;

pub use error::{ManifestError, Result};
pub use resolver::{LayoutMediaMap, ManifestDiff, ManifestResolver};
pub use xlf::parse_layout_xlf;
