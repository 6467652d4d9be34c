//! Canonical cache identity for a cited page

use std::fmt;

use super::citation::Citation;

/// Joins the canonical locator and the page number.
///
/// A NUL byte cannot appear in a URL or a filesystem path, so two different
/// (locator, page) pairs can never produce the same joined form.
const KEY_SEPARATOR: char = '\u{0}';

/// Cache key for a cited page
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewKey {
    /// Document locator with any fragment and query removed
    pub locator: String,
    /// Page number (1-indexed)
    pub page: u32,
}

impl PreviewKey {
    /// Create a key from an already canonical locator
    #[must_use]
    pub fn new(locator: impl Into<String>, page: u32) -> Self {
        Self {
            locator: locator.into(),
            page,
        }
    }

    /// Joined single-string form, suitable for hashing into file names
    #[must_use]
    pub fn joined(&self) -> String {
        format!("{}{}{}", self.locator, KEY_SEPARATOR, self.page)
    }
}

impl fmt::Display for PreviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.locator, self.page)
    }
}

/// Strip decorations from a document locator.
///
/// Cuts at the first `#`, then at the first `?` of what remains.
#[must_use]
pub fn canonical_locator(locator: &str) -> &str {
    let without_fragment = locator.split_once('#').map_or(locator, |(head, _)| head);
    without_fragment
        .split_once('?')
        .map_or(without_fragment, |(head, _)| head)
}

/// Derive the cache key for a citation
#[must_use]
pub fn derive_key(citation: &Citation) -> PreviewKey {
    PreviewKey::new(
        canonical_locator(&citation.document_locator),
        citation.page_number,
    )
}
