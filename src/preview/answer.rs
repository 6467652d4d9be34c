//! Conversion from backend answers to citations
//!
//! The chat backend answers either with a JSON envelope `{text, documents}` or
//! with raw tagged text where the answer sits in `<response>` blocks and the
//! retrieved documents sit in `<source>` blocks. Nothing from the backend
//! reaches the preview cache without going through [`Citation::from_value`].

use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};

use super::citation::{Citation, CitationError, Message};

static RESPONSE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<response>(.*?)</response>").expect("valid regex"));

static SOURCE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<source>(.*?)</source>").expect("valid regex"));

/// One `file_name`, `url` or `page` field in either quote style. Records carry
/// these keys in any order, next to a free-form `content` field.
static SOURCE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'](file_name|url|page)["']\s*:\s*(?:"([^"]*)"|'([^']*)'|(-?\d+))"#)
        .expect("valid regex")
});

/// A validated assistant answer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl AssistantReply {
    /// Read the `{text, documents}` response envelope
    #[must_use]
    pub fn from_envelope(value: &Value) -> Self {
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let citations = value
            .get("documents")
            .map(|docs| citations_from_documents(docs).0)
            .unwrap_or_default();
        Self { text, citations }
    }

    #[must_use]
    pub fn into_message(self) -> Message {
        Message::assistant(self.text, self.citations)
    }
}

/// Validate a `documents` array, keeping the good records.
///
/// Invalid records are logged and returned separately so one bad record never
/// drops the rest of the answer.
#[must_use]
pub fn citations_from_documents(documents: &Value) -> (Vec<Citation>, Vec<CitationError>) {
    let Some(items) = documents.as_array() else {
        warn!("Backend documents field is not an array, ignoring");
        return (Vec::new(), Vec::new());
    };

    let mut citations = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for item in items {
        match Citation::from_value(item) {
            Ok(citation) => citations.push(citation),
            Err(e) => {
                warn!("Dropping document record {item}: {e}");
                rejected.push(e);
            }
        }
    }
    (citations, rejected)
}

/// Parse a raw tagged backend answer.
///
/// Uses the last `<response>` block as text and the last `<source>` block as
/// the citation list.
#[must_use]
pub fn parse_answer_text(input: &str) -> AssistantReply {
    // Untagged input is shown as-is rather than as an empty answer
    let text = RESPONSE_BLOCK
        .captures_iter(input)
        .last()
        .and_then(|c| c.get(1))
        .map_or(input, |m| m.as_str())
        .trim()
        .to_string();

    let citations = SOURCE_BLOCK
        .captures_iter(input)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| parse_source_block(m.as_str()))
        .unwrap_or_default();

    AssistantReply { text, citations }
}

fn parse_source_block(block: &str) -> Vec<Citation> {
    let block = block.trim();
    if block.is_empty() || block == "[]" {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(block) {
        return citations_from_documents(&value).0;
    }

    debug!("Source block is not JSON, scanning records");
    let mut citations = Vec::new();
    for record in scan_source_records(block) {
        match Citation::from_value(&record) {
            Ok(citation) => citations.push(citation),
            Err(e) => warn!("Dropping source record {record}: {e}"),
        }
    }
    citations
}

/// Group scanned fields into records; a key seen twice starts the next record.
fn scan_source_records(block: &str) -> Vec<Value> {
    let mut records = Vec::new();
    let mut current = Map::new();
    for caps in SOURCE_FIELD.captures_iter(block) {
        let name = &caps[1];
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());

        if current.contains_key(name) {
            records.push(Value::Object(std::mem::take(&mut current)));
        }
        current.insert(name.to_string(), Value::String(value.to_string()));
    }
    if !current.is_empty() {
        records.push(Value::Object(current));
    }
    records
}
