//! Interpretation of the workflow's `answer` text.
//!
//! Depending on the workflow revision the answer arrives as a JSON object, as
//! a JSON object whose `result` field is another JSON-encoded object, or as
//! plain text split into `▼label` sections. Parsers run in order and the
//! first one that applies wins.

use serde::Serialize;
use serde_json::{Map, Value};

pub const SECTION_MARKER: char = '▼';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFormat {
    NestedJson,
    Json,
    Sections,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub format: AnswerFormat,
    pub result: Value,
}

type Parser = fn(&str) -> Option<Value>;

const JSON_PARSERS: [(AnswerFormat, Parser); 2] = [
    (AnswerFormat::NestedJson, nested_json),
    (AnswerFormat::Json, json_value),
];

const ALL_PARSERS: [(AnswerFormat, Parser); 3] = [
    (AnswerFormat::NestedJson, nested_json),
    (AnswerFormat::Json, json_value),
    (AnswerFormat::Sections, sections),
];

/// Full chain: nested JSON, then JSON, then `▼` sections. Only blank text
/// matches nothing.
pub fn parse_answer(text: &str) -> Option<ParsedAnswer> {
    run_chain(&ALL_PARSERS, text)
}

/// JSON-only subset of the chain, for callers that treat anything else as
/// free text.
pub fn parse_json_answer(text: &str) -> Option<ParsedAnswer> {
    run_chain(&JSON_PARSERS, text)
}

fn run_chain(parsers: &[(AnswerFormat, Parser)], text: &str) -> Option<ParsedAnswer> {
    parsers.iter().find_map(|(format, parser)| {
        parser(text).map(|result| ParsedAnswer {
            format: *format,
            result,
        })
    })
}

fn nested_json(text: &str) -> Option<Value> {
    let outer = json_value(text)?;
    let inner = json_value(outer.get("result")?.as_str()?)?;
    inner.is_object().then_some(inner)
}

fn json_value(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

// Text before the first marker, or text with no marker at all, becomes a
// section of its own.
fn sections(text: &str) -> Option<Value> {
    let mut fields = Map::new();
    for piece in text.split(SECTION_MARKER) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        let (label, value) = piece.split_once('\n').unwrap_or((piece, ""));
        fields.insert(
            format!("{}{}", SECTION_MARKER, label.trim()),
            Value::String(value.trim().to_string()),
        );
    }

    if fields.is_empty() {
        None
    } else {
        Some(Value::Object(fields))
    }
}
