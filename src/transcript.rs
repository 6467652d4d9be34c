//! Chat transcript loading

use std::fs;
use std::path::Path;

use anyhow::Context;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::preview::{Message, Role, citations_from_documents, parse_answer_text};

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: Role,
    #[serde(default)]
    text: String,
    #[serde(default)]
    documents: Value,
}

/// Parse a JSON array of `{role, text, documents}` messages.
///
/// Each `documents` list goes through citation validation; bad records are
/// dropped, never the message.
pub fn parse_transcript(json: &str) -> anyhow::Result<Vec<Message>> {
    let raw: Vec<RawMessage> = serde_json::from_str(json).context("Transcript is not a JSON message array")?;

    let messages = raw
        .into_iter()
        .map(|m| {
            let citations = if m.documents.is_null() {
                Vec::new()
            } else {
                citations_from_documents(&m.documents).0
            };
            Message {
                role: m.role,
                text: m.text,
                citations,
            }
        })
        .collect::<Vec<_>>();

    debug!("Parsed transcript with {} messages", messages.len());
    Ok(messages)
}

/// Load a transcript file; `raw` treats it as one tagged backend answer
pub fn load_transcript(path: &Path, raw: bool) -> anyhow::Result<Vec<Message>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read transcript {path:?}"))?;

    if raw {
        return Ok(vec![parse_answer_text(&content).into_message()]);
    }
    parse_transcript(&content).with_context(|| format!("Failed to parse transcript {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::Citation;

    #[test]
    fn parses_messages_and_validates_documents() {
        let json = r#"[
            {"role": "user", "text": "what about page 3?"},
            {"role": "assistant", "text": "see", "documents": [
                {"title": "Doc", "url": "https://x/doc.pdf?v=2", "page": 3},
                {"title": "Bad", "url": "https://x/doc.pdf", "page": "zero"}
            ]}
        ]"#;
        let messages = parse_transcript(json).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].citations.is_empty());
        assert_eq!(
            messages[1].citations,
            vec![Citation::new("Doc", "https://x/doc.pdf?v=2", 3)]
        );
    }

    #[test]
    fn role_defaults_to_assistant() {
        let messages = parse_transcript(r#"[{"text": "hi"}]"#).unwrap();
        assert_eq!(messages[0].role, Role::Assistant);
    }

    #[test]
    fn rejects_non_arrays() {
        assert!(parse_transcript(r#"{"text": "hi"}"#).is_err());
    }

    #[test]
    fn loads_raw_answers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.txt");
        fs::write(
            &path,
            "<response>ok</response><source>[{'file_name': 'a.pdf', 'url': 'a.pdf', 'page': 1, 'content': ''}]</source>",
        )
        .unwrap();

        let messages = load_transcript(&path, true).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "ok");
        assert_eq!(messages[0].citations, vec![Citation::new("a.pdf", "a.pdf", 1)]);
    }
}
