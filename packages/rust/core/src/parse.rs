//! Parsing model answers into link mappings.
//!
//! Models answer with a flat mapping of URL → description, as JSON or YAML,
//! often wrapped in a Markdown code fence. Anything that is not a flat
//! mapping is a parse error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use linkscout_shared::{LinkScoutError, RelevantLinks, Result};

/// Strip a surrounding Markdown code fence, if any.
///
/// The first fenced block wins; text outside it (a preamble like
/// "Here are the links:") is ignored.
pub fn strip_code_fence(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
    });

    match FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

/// Parse a raw model answer into a link mapping.
pub fn parse_relevant_links(raw: &str) -> Result<RelevantLinks> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(LinkScoutError::parse("empty response from backend"));
    }

    let value = parse_document(body)?;
    links_from_value(value)
}

/// JSON first, then YAML (which the prompt asks for).
fn parse_document(body: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_str::<Value>(body).map_err(|yaml_err| {
            LinkScoutError::parse(format!(
                "response is neither JSON ({json_err}) nor YAML ({yaml_err})"
            ))
        }),
    }
}

fn links_from_value(value: Value) -> Result<RelevantLinks> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Err(LinkScoutError::parse("response holds no mapping")),
        Value::Array(_) => {
            return Err(LinkScoutError::parse("expected a mapping of links, got a list"));
        }
        _ => {
            return Err(LinkScoutError::parse(
                "expected a mapping of links, got a plain value",
            ));
        }
    };

    map.into_iter()
        .map(|(url, value)| {
            let description = match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(LinkScoutError::parse(format!(
                        "value for `{url}` must be a string or null"
                    )));
                }
            };
            Ok((url, description))
        })
        .collect()
}
