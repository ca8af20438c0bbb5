use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::value_to_text;

/// Which strategy produced a parsed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// A JSON array was found and decoded
    JsonArray,
    /// Entries were grouped from `<n>.` numbered lines
    NumberedLines,
    /// Nothing structured was found; the whole reply fills every slot
    Degraded,
}

/// Per-record outputs split out of one reply, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub outputs: Vec<String>,
    pub strategy: ParseStrategy,
}

impl ParsedBatch {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).map(String::as_str)
    }
}

fn json_array() -> &'static Regex {
    static JSON_ARRAY: OnceLock<Regex> = OnceLock::new();
    JSON_ARRAY.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is valid"))
}

fn numbered_line() -> &'static Regex {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    NUMBERED.get_or_init(|| Regex::new(r"^\s*\d+\.(\s.*)?$").expect("numbered pattern is valid"))
}

/// Splits a combined reply into at most `expected` outputs.
///
/// Never fails. A JSON array wins over numbered lines; if neither yields
/// anything the full reply is repeated for every expected position.
/// Extra entries are dropped but missing ones are never invented.
pub fn parse_batch_response(reply: &str, expected: usize) -> ParsedBatch {
    if let Some(outputs) = parse_json_array(reply, expected) {
        return ParsedBatch {
            outputs,
            strategy: ParseStrategy::JsonArray,
        };
    }
    if let Some(outputs) = parse_numbered_lines(reply, expected) {
        log::debug!("batch reply parsed from numbered lines");
        return ParsedBatch {
            outputs,
            strategy: ParseStrategy::NumberedLines,
        };
    }
    log::debug!("batch reply has no structure, repeating it {expected} times");
    ParsedBatch {
        outputs: vec![reply.to_string(); expected],
        strategy: ParseStrategy::Degraded,
    }
}

fn parse_json_array(reply: &str, expected: usize) -> Option<Vec<String>> {
    let candidate = json_array().find(reply)?;
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(candidate.as_str()) else {
        return None;
    };
    let outputs: Vec<String> = items.into_iter().take(expected).map(element_text).collect();
    (!outputs.is_empty()).then_some(outputs)
}

fn element_text(element: Value) -> String {
    match element {
        Value::Object(mut object) => match object.remove("response") {
            Some(response) => value_to_text(&response),
            None => Value::Object(object).to_string(),
        },
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn parse_numbered_lines(reply: &str, expected: usize) -> Option<Vec<String>> {
    let mut segments: Vec<String> = Vec::new();
    for line in reply.lines() {
        if let Some(caps) = numbered_line().captures(line) {
            let first = caps.get(1).map_or("", |m| m.as_str()).trim();
            segments.push(first.to_string());
            continue;
        }
        // Text before the first marker has no owner and is dropped.
        let Some(current) = segments.last_mut() else {
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    segments.truncate(expected);
    (!segments.is_empty()).then_some(segments)
}
