//! Pipeline state and the link-search input/output types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LinkScoutError, Result};

/// State key holding the user's task description.
pub const USER_PROMPT_KEY: &str = "user_prompt";
/// State key holding the candidate link URLs.
pub const LINK_URLS_KEY: &str = "link_urls";
/// State key holding the content chunks.
pub const PARSED_DOC_KEY: &str = "parsed_doc";
/// State key written with the relevant links.
pub const RELEVANT_LINKS_KEY: &str = "relevant_links";

/// Link URL → short description, `None` when nothing could be inferred.
pub type RelevantLinks = HashMap<String, Option<String>>;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Shared state threaded between the steps of a scraping graph.
///
/// A thin wrapper over a JSON object so that state files round-trip without
/// loss; steps read and write their own keys and leave the rest alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState(Map<String, Value>);

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or overwrite a key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a state object from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| LinkScoutError::validation(format!("invalid state JSON: {e}")))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(LinkScoutError::validation(format!(
                "pipeline state must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<Map<String, Value>> for PipelineState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// LinkSearchInput
// ---------------------------------------------------------------------------

/// Everything the link search reads from state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSearchInput {
    /// The task the links are judged against.
    pub user_prompt: String,
    /// Candidate links, in page order.
    pub link_urls: Vec<String>,
    /// Content chunks, processed in this order.
    pub parsed_doc: Vec<String>,
}

impl LinkSearchInput {
    /// Read the input keys out of pipeline state.
    ///
    /// A key that is absent (or `null`) yields [`LinkScoutError::MissingInput`];
    /// a key with the wrong shape yields [`LinkScoutError::Validation`].
    /// Chunks may be plain strings or document objects with a `page_content`
    /// string.
    pub fn from_state(state: &PipelineState) -> Result<Self> {
        let user_prompt = match required(state, USER_PROMPT_KEY)? {
            Value::String(s) => s.clone(),
            other => return Err(wrong_shape(USER_PROMPT_KEY, "a string", other)),
        };

        let link_urls = match required(state, LINK_URLS_KEY)? {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(wrong_shape(
                        &format!("{LINK_URLS_KEY}[{i}]"),
                        "a string",
                        other,
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            other => return Err(wrong_shape(LINK_URLS_KEY, "a list of strings", other)),
        };

        let parsed_doc = match required(state, PARSED_DOC_KEY)? {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| chunk_text(item, i))
                .collect::<Result<Vec<_>>>()?,
            other => return Err(wrong_shape(PARSED_DOC_KEY, "a list of chunks", other)),
        };

        Ok(Self {
            user_prompt,
            link_urls,
            parsed_doc,
        })
    }
}

fn required<'a>(state: &'a PipelineState, key: &str) -> Result<&'a Value> {
    match state.get(key) {
        None | Some(Value::Null) => Err(LinkScoutError::missing_input(key)),
        Some(value) => Ok(value),
    }
}

fn chunk_text(item: &Value, index: usize) -> Result<String> {
    match item {
        Value::String(s) => Ok(s.clone()),
        Value::Object(doc) => match doc.get("page_content") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(LinkScoutError::validation(format!(
                "{PARSED_DOC_KEY}[{index}] is an object without a `page_content` string"
            ))),
        },
        other => Err(wrong_shape(
            &format!("{PARSED_DOC_KEY}[{index}]"),
            "a string or a document object",
            other,
        )),
    }
}

fn wrong_shape(key: &str, expected: &str, got: &Value) -> LinkScoutError {
    LinkScoutError::validation(format!(
        "`{key}` must be {expected}, got {}",
        json_kind(got)
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// LinkSearchOutput
// ---------------------------------------------------------------------------

/// What the link search produces; the caller decides where it lands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSearchOutput {
    pub relevant_links: RelevantLinks,
}

impl LinkSearchOutput {
    /// JSON form of the result: an object of URL → string or `null`.
    pub fn to_value(&self) -> Value {
        let map = self
            .relevant_links
            .iter()
            .map(|(url, description)| {
                let value = description
                    .as_ref()
                    .map_or(Value::Null, |d| Value::String(d.clone()));
                (url.clone(), value)
            })
            .collect::<Map<_, _>>();
        Value::Object(map)
    }

    /// Write `relevant_links` into state, overwriting any previous value.
    pub fn apply_to(&self, state: &mut PipelineState) {
        state.insert(RELEVANT_LINKS_KEY, self.to_value());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state(value: Value) -> PipelineState {
        match value {
            Value::Object(map) => PipelineState::from(map),
            _ => panic!("test state must be an object"),
        }
    }

    #[test]
    fn input_from_complete_state() {
        let s = state(json!({
            "user_prompt": "find pricing pages",
            "link_urls": ["https://a.com/x", "https://a.com/y"],
            "parsed_doc": ["first chunk", {"page_content": "second chunk", "metadata": {}}],
        }));
        let input = LinkSearchInput::from_state(&s).expect("valid state");
        assert_eq!(input.user_prompt, "find pricing pages");
        assert_eq!(input.link_urls.len(), 2);
        assert_eq!(input.parsed_doc, vec!["first chunk", "second chunk"]);
    }

    #[test]
    fn missing_user_prompt_is_missing_input() {
        let s = state(json!({ "link_urls": [], "parsed_doc": [] }));
        let err = LinkSearchInput::from_state(&s).unwrap_err();
        assert!(matches!(err, LinkScoutError::MissingInput { ref key } if key == "user_prompt"));
    }

    #[test]
    fn null_links_are_missing_input() {
        let s = state(json!({ "user_prompt": "x", "link_urls": null, "parsed_doc": [] }));
        let err = LinkSearchInput::from_state(&s).unwrap_err();
        assert!(matches!(err, LinkScoutError::MissingInput { ref key } if key == "link_urls"));
    }

    #[test]
    fn wrong_shapes_are_validation_errors() {
        let s = state(json!({ "user_prompt": 42, "link_urls": [], "parsed_doc": [] }));
        assert!(matches!(
            LinkSearchInput::from_state(&s).unwrap_err(),
            LinkScoutError::Validation { .. }
        ));

        let s = state(json!({ "user_prompt": "x", "link_urls": ["ok", 3], "parsed_doc": [] }));
        let err = LinkSearchInput::from_state(&s).unwrap_err();
        assert!(err.to_string().contains("link_urls[1]"));

        let s = state(json!({ "user_prompt": "x", "link_urls": [], "parsed_doc": [{"text": "no"}] }));
        let err = LinkSearchInput::from_state(&s).unwrap_err();
        assert!(err.to_string().contains("page_content"));
    }

    #[test]
    fn empty_sequences_are_accepted() {
        let s = state(json!({ "user_prompt": "x", "link_urls": [], "parsed_doc": [] }));
        let input = LinkSearchInput::from_state(&s).expect("valid state");
        assert!(input.link_urls.is_empty());
        assert!(input.parsed_doc.is_empty());
    }

    #[test]
    fn output_apply_keeps_other_keys() {
        let mut s = state(json!({ "user_prompt": "x", "other": 1, "relevant_links": {"old": "gone"} }));
        let mut links = RelevantLinks::new();
        links.insert("https://a.com/x".into(), Some("product page".into()));
        links.insert("https://a.com/y".into(), None);
        LinkSearchOutput {
            relevant_links: links,
        }
        .apply_to(&mut s);

        assert_eq!(s.get("other"), Some(&json!(1)));
        assert_eq!(
            s.get(RELEVANT_LINKS_KEY),
            Some(&json!({ "https://a.com/x": "product page", "https://a.com/y": null }))
        );
    }

    #[test]
    fn state_from_json_rejects_non_objects() {
        assert!(PipelineState::from_json_str(r#"{"a": 1}"#).is_ok());
        let err = PipelineState::from_json_str("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("a list"));
    }

    #[test]
    fn state_fixture_validates() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/state.fixture.json")
            .expect("read fixture");
        let s = PipelineState::from_json_str(&fixture).expect("parse fixture state");
        let input = LinkSearchInput::from_state(&s).expect("fixture input");
        assert_eq!(input.link_urls.len(), 3);
        assert_eq!(input.parsed_doc.len(), 2);
        assert!(s.contains_key("url"));
    }
}
