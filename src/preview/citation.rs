//! Citations and chat messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::canonical_locator;

/// A reference to one page of one document returned alongside a chat answer.
///
/// Deserializing goes through [`Citation::from_value`], so a decoded citation
/// always has a locator and a page of at least 1.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Citation {
    /// Display label, not part of identity
    pub title: String,
    /// Document locator as the backend sent it (may carry `?query` / `#fragment`)
    pub document_locator: String,
    /// Page number (1-indexed)
    pub page_number: u32,
}

/// Reasons a backend document record is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CitationError {
    #[error("document record is not an object")]
    NotAnObject,

    #[error("document record has no usable url")]
    MissingUrl,

    #[error("document record has no page number")]
    MissingPage,

    #[error("invalid page number: {raw}")]
    InvalidPage { raw: String },
}

impl Citation {
    #[must_use]
    pub fn new(title: impl Into<String>, document_locator: impl Into<String>, page_number: u32) -> Self {
        Self {
            title: title.into(),
            document_locator: document_locator.into(),
            page_number,
        }
    }

    /// Validate one backend document record.
    ///
    /// Accepts `{title|file_name, url, page}`; `page` may be a number or a
    /// numeric string and must be at least 1.
    pub fn from_value(value: &Value) -> Result<Self, CitationError> {
        let obj = value.as_object().ok_or(CitationError::NotAnObject)?;

        let url = obj
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(CitationError::MissingUrl)?;

        let page = obj.get("page").ok_or(CitationError::MissingPage)?;
        let page_number = parse_page(page)?;

        let title = obj
            .get("title")
            .or_else(|| obj.get("file_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(|| fallback_title(url), str::to_string);

        Ok(Self::new(title, url, page_number))
    }
}

impl TryFrom<Value> for Citation {
    type Error = CitationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

fn parse_page(value: &Value) -> Result<u32, CitationError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .filter(|&p| p >= 1)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or_else(|| CitationError::InvalidPage {
            raw: value.to_string(),
        })
}

/// Last path segment of the canonical locator, or the locator itself
fn fallback_title(url: &str) -> String {
    let canonical = canonical_locator(url).trim_end_matches('/');
    canonical
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(canonical)
        .to_string()
}

/// Chat turn author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[default]
    Assistant,
}

/// A chat turn with the citations it carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub citations: Vec<Citation>,
}

impl Message {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: Vec::new(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            citations,
        }
    }
}
