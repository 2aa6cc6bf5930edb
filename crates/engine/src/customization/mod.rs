//! Deterministic personalization sources.
//!
//! Each source either resolves a line item with confidence or reports a
//! [`Miss`], in which case the item is handed to the AI extractor:
//!
//! - [`archive`]: Amazon `CustomizedURL` zip archives holding a JSON manifest
//! - [`notes`]: structured blocks typed into eBay buyer notes

pub mod archive;
pub mod manifest;
pub mod notes;

use printline_core::DataSource;

pub use archive::{ArchiveFetcher, CustomizationFileResolver, HttpArchiveFetcher, ResolveError};
pub use manifest::{CustomizationData, parse_manifest};
pub use notes::{NoteBlock, parse_blocks, resolve_from_note};

/// SKU marker for products whose text is always printed in capitals.
pub const REGKEY_MARKER: &str = "REGKEY";

/// Annotation for tasks resolved from a customization archive.
pub const FILE_ANNOTATION: &str = "Data from Amazon CustomizedURL";

/// Annotation for tasks resolved from the buyer note.
pub const NOTE_ANNOTATION: &str = "Data from eBay customer notes";

/// Personalization recovered from a deterministic source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub source: DataSource,
    pub custom_text: Option<String>,
    pub color_1: Option<String>,
    pub color_2: Option<String>,
    pub annotation: String,
    pub needs_review: bool,
    pub review_reason: Option<String>,
}

/// Why a deterministic source did not resolve an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    /// The marketplace has no deterministic source.
    NotApplicable,
    /// Amazon item without a `CustomizedURL` option.
    NoCustomizationUrl,
    /// eBay order without a buyer note.
    NoNote,
    /// No note block matched the item's SKU and color.
    NoMatchingBlock,
    /// The archive was read but held no text or colors.
    Empty,
    /// Fetching or parsing failed.
    Failed(String),
}

impl Miss {
    /// Failures are logged and carried into the review reason; plain misses
    /// are expected.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for Miss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotApplicable => write!(f, "no deterministic source for marketplace"),
            Self::NoCustomizationUrl => write!(f, "no CustomizedURL option"),
            Self::NoNote => write!(f, "no customer notes"),
            Self::NoMatchingBlock => write!(f, "no matching block in customer notes"),
            Self::Empty => write!(f, "customization file held no text or colors"),
            Self::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Upper-case `text` when the SKU carries [`REGKEY_MARKER`].
#[must_use]
pub fn apply_sku_text_rule(text: Option<String>, sku: &str) -> Option<String> {
    if sku.to_uppercase().contains(REGKEY_MARKER) {
        text.map(|t| t.to_uppercase())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regkey_sku_uppercases_text() {
        assert_eq!(
            apply_sku_text_rule(Some("hello".to_string()), "KEY-regkey-01"),
            Some("HELLO".to_string())
        );
        assert_eq!(
            apply_sku_text_rule(Some("hello".to_string()), "PLAIN-01"),
            Some("hello".to_string())
        );
        assert_eq!(apply_sku_text_rule(None, "REGKEY"), None);
    }

    #[test]
    fn test_only_failures_are_failures() {
        assert!(Miss::Failed("HTTP 404".to_string()).is_failure());
        assert!(!Miss::NoCustomizationUrl.is_failure());
        assert!(!Miss::Empty.is_failure());
    }
}
