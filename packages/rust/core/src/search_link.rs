//! Link relevance search node.
//!
//! For every content chunk, asks the text-generation backend which of the
//! page's links matter for the user's task and merges the answers into one
//! URL → description mapping.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use linkscout_shared::{
    LinkScoutError, LinkSearchInput, LinkSearchOutput, PipelineState, RelevantLinks, Result,
};

use crate::backend::TextGenerator;
use crate::parse::parse_relevant_links;
use crate::prompt::render_relevant_links_prompt;

/// Name used in logs when none is given.
pub const DEFAULT_NODE_NAME: &str = "SearchLinkNode";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Construction options for [`SearchLinkNode`].
#[derive(Clone, Default)]
pub struct SearchLinkConfig {
    /// Backend that judges relevance. Required.
    pub llm_model: Option<Arc<dyn TextGenerator>>,
    /// Log every chunk at `info` instead of `debug`.
    pub verbose: bool,
}

impl SearchLinkConfig {
    pub fn new(llm_model: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm_model: Some(llm_model),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl fmt::Debug for SearchLinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchLinkConfig")
            .field("llm_model", &self.llm_model.as_ref().map(|_| "<backend>"))
            .field("verbose", &self.verbose)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for a link search.
pub trait SearchProgress: Send + Sync {
    /// Called before chunk `current` (1-based) of `total` is sent.
    fn chunk_started(&self, current: usize, total: usize);
    /// Called once all chunks are merged.
    fn finished(&self, links_found: usize);
}

/// No-op search progress.
pub struct SilentSearchProgress;

impl SearchProgress for SilentSearchProgress {
    fn chunk_started(&self, _current: usize, _total: usize) {}
    fn finished(&self, _links_found: usize) {}
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Filters a page's links down to those relevant to the user's task.
pub struct SearchLinkNode {
    node_name: String,
    llm_model: Arc<dyn TextGenerator>,
    verbose: bool,
}

impl SearchLinkNode {
    /// Build the node. Fails if no backend is configured.
    pub fn new(config: SearchLinkConfig) -> Result<Self> {
        let llm_model = config.llm_model.ok_or_else(|| {
            LinkScoutError::config("llm_model is required to build a SearchLinkNode")
        })?;

        Ok(Self {
            node_name: DEFAULT_NODE_NAME.to_string(),
            llm_model,
            verbose: config.verbose,
        })
    }

    /// Override the name shown in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Run the search over every chunk, strictly in order.
    ///
    /// One backend request per chunk; the next request is issued only after
    /// the previous answer has been parsed and merged. Later chunks overwrite
    /// descriptions from earlier ones. Any backend or parse error aborts the
    /// whole search.
    #[instrument(
        skip_all,
        fields(
            node = %self.node_name,
            chunks = input.parsed_doc.len(),
            links = input.link_urls.len(),
        )
    )]
    pub async fn execute(
        &self,
        input: &LinkSearchInput,
        progress: &dyn SearchProgress,
    ) -> Result<LinkSearchOutput> {
        info!("--- executing {} ---", self.node_name);

        let total = input.parsed_doc.len();
        let mut relevant_links = RelevantLinks::new();

        for (i, chunk) in input.parsed_doc.iter().enumerate() {
            let current = i + 1;
            progress.chunk_started(current, total);
            if self.verbose {
                info!(chunk = current, total, "processing chunk");
            } else {
                debug!(chunk = current, total, "processing chunk");
            }

            let prompt = render_relevant_links_prompt(&input.user_prompt, &input.link_urls, chunk);
            let raw = self.llm_model.generate(&prompt).await?;
            let answer = parse_relevant_links(&raw).map_err(|e| match e {
                LinkScoutError::Parse { message } => {
                    LinkScoutError::parse(format!("chunk {current}/{total}: {message}"))
                }
                other => other,
            })?;

            debug!(chunk = current, entries = answer.len(), "merging chunk answer");
            relevant_links.extend(answer);
        }

        progress.finished(relevant_links.len());
        info!(links_found = relevant_links.len(), "link search complete");

        Ok(LinkSearchOutput { relevant_links })
    }

    /// Read the input from `state`, search, and return a copy of `state` with
    /// `relevant_links` set.
    ///
    /// The caller's state is left untouched, so a failed run commits nothing.
    pub async fn run(
        &self,
        state: &PipelineState,
        progress: &dyn SearchProgress,
    ) -> Result<PipelineState> {
        let input = LinkSearchInput::from_state(state)?;
        let output = self.execute(&input, progress).await?;

        let mut updated = state.clone();
        output.apply_to(&mut updated);
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use linkscout_shared::RELEVANT_LINKS_KEY;

    use super::*;

    /// Backend stub that replays canned answers and records every prompt.
    struct StubBackend {
        answers: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().map(|a| Ok(a.to_string())).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn with_results(answers: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for StubBackend {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        started: AtomicUsize,
        finished_with: AtomicUsize,
    }

    impl SearchProgress for CountingProgress {
        fn chunk_started(&self, _current: usize, _total: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn finished(&self, links_found: usize) {
            self.finished_with.store(links_found, Ordering::SeqCst);
        }
    }

    fn node(backend: Arc<StubBackend>) -> SearchLinkNode {
        SearchLinkNode::new(SearchLinkConfig::new(backend)).expect("node")
    }

    fn input(chunks: &[&str]) -> LinkSearchInput {
        LinkSearchInput {
            user_prompt: "find product pages".into(),
            link_urls: vec!["https://a.com/x".into(), "https://a.com/y".into()],
            parsed_doc: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn state(value: serde_json::Value) -> PipelineState {
        PipelineState::from_json_str(&value.to_string()).expect("state")
    }

    #[test]
    fn missing_backend_fails_construction() {
        let err = SearchLinkNode::new(SearchLinkConfig::default()).err().expect("must fail");
        assert!(matches!(err, LinkScoutError::Config { .. }));
        assert!(err.to_string().contains("llm_model"));
    }

    #[test]
    fn config_defaults_and_name() {
        let config = SearchLinkConfig::new(StubBackend::new(&[]));
        assert!(!config.verbose);
        let node = SearchLinkNode::new(config.verbose(true)).expect("node");
        assert_eq!(node.node_name(), DEFAULT_NODE_NAME);
        assert_eq!(node.with_name("LinkFilter").node_name(), "LinkFilter");
    }

    #[tokio::test]
    async fn one_backend_call_per_chunk() {
        let backend = StubBackend::new(&[]);
        let progress = CountingProgress::default();
        node(backend.clone())
            .execute(&input(&["a", "b", "c"]), &progress)
            .await
            .expect("execute");
        assert_eq!(backend.calls(), 3);
        assert_eq!(progress.started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn chunks_are_sent_in_input_order() {
        let backend = StubBackend::new(&[]);
        node(backend.clone())
            .execute(&input(&["MARKER-1", "MARKER-2", "MARKER-3"]), &SilentSearchProgress)
            .await
            .expect("execute");

        let prompts = backend.prompts();
        for (i, prompt) in prompts.iter().enumerate() {
            assert!(prompt.contains(&format!("Content: MARKER-{}", i + 1)));
            assert!(prompt.contains("find product pages"));
            assert!(prompt.contains("https://a.com/y"));
        }
    }

    #[tokio::test]
    async fn later_chunks_overwrite_earlier_descriptions() {
        let backend = StubBackend::new(&[r#"{"x": "d1"}"#, r#"{"x": "d2"}"#]);
        let output = node(backend)
            .execute(&input(&["A", "B"]), &SilentSearchProgress)
            .await
            .expect("execute");
        assert_eq!(output.relevant_links.len(), 1);
        assert_eq!(output.relevant_links["x"].as_deref(), Some("d2"));
    }

    #[tokio::test]
    async fn disjoint_answers_are_unioned() {
        let backend = StubBackend::new(&[r#"{"x": "d1"}"#, "y: d2"]);
        let progress = CountingProgress::default();
        let output = node(backend)
            .execute(&input(&["A", "B"]), &progress)
            .await
            .expect("execute");
        assert_eq!(output.relevant_links.len(), 2);
        assert_eq!(output.relevant_links["x"].as_deref(), Some("d1"));
        assert_eq!(output.relevant_links["y"].as_deref(), Some("d2"));
        assert_eq!(progress.finished_with.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_document_makes_no_calls() {
        let backend = StubBackend::new(&[]);
        let s = state(json!({
            "user_prompt": "anything",
            "link_urls": ["https://a.com/x"],
            "parsed_doc": [],
        }));
        let updated = node(backend.clone())
            .run(&s, &SilentSearchProgress)
            .await
            .expect("run");
        assert_eq!(backend.calls(), 0);
        assert_eq!(updated.get(RELEVANT_LINKS_KEY), Some(&json!({})));
    }

    #[tokio::test]
    async fn missing_user_prompt_fails_before_any_call() {
        let backend = StubBackend::new(&[]);
        let s = state(json!({ "link_urls": [], "parsed_doc": ["chunk"] }));
        let err = node(backend.clone())
            .run(&s, &SilentSearchProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkScoutError::MissingInput { .. }));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn product_page_example() {
        let backend = StubBackend::new(&[r#"{"https://a.com/x": "product page"}"#]);
        let s = state(json!({
            "url": "https://a.com",
            "user_prompt": "find product pages",
            "link_urls": ["https://a.com/x", "https://a.com/y"],
            "parsed_doc": ["chunk mentioning x"],
        }));
        let updated = node(backend)
            .run(&s, &SilentSearchProgress)
            .await
            .expect("run");

        assert_eq!(
            updated.get(RELEVANT_LINKS_KEY),
            Some(&json!({ "https://a.com/x": "product page" }))
        );
        assert_eq!(updated.get("url"), Some(&json!("https://a.com")));
        assert!(!s.contains_key(RELEVANT_LINKS_KEY));
    }

    #[tokio::test]
    async fn malformed_answer_aborts_without_committing() {
        let backend = StubBackend::new(&[r#"{"x": "d1"}"#, "not a mapping", r#"{"z": "d3"}"#]);
        let s = state(json!({
            "user_prompt": "p",
            "link_urls": [],
            "parsed_doc": ["A", "B", "C"],
        }));
        let err = node(backend.clone())
            .run(&s, &SilentSearchProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, LinkScoutError::Parse { .. }));
        assert!(err.to_string().contains("chunk 2/3"));
        assert_eq!(backend.calls(), 2);
        assert!(!s.contains_key(RELEVANT_LINKS_KEY));
    }

    #[tokio::test]
    async fn backend_error_propagates_unchanged() {
        let backend = StubBackend::with_results(vec![Err(LinkScoutError::Backend(
            "quota exceeded".into(),
        ))]);
        let err = node(backend.clone())
            .execute(&input(&["A", "B"]), &SilentSearchProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkScoutError::Backend(ref m) if m == "quota exceeded"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn verbose_does_not_change_results() {
        let answers = [r#"{"x": "d1"}"#, r#"{"y": null}"#];
        let quiet = node(StubBackend::new(&answers))
            .execute(&input(&["A", "B"]), &SilentSearchProgress)
            .await
            .expect("quiet");
        let loud = SearchLinkNode::new(SearchLinkConfig::new(StubBackend::new(&answers)).verbose(true))
            .expect("node")
            .execute(&input(&["A", "B"]), &SilentSearchProgress)
            .await
            .expect("verbose");
        assert_eq!(quiet, loud);
        assert_eq!(loud.relevant_links["y"], None);
    }
}
