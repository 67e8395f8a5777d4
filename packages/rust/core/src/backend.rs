//! The text-generation seam.

use linkscout_shared::Result;

/// A text-generation backend: takes a rendered instruction, returns the raw
/// completion text.
///
/// Implementations own transport, retries, and timeouts; callers issue one
/// request at a time and treat any error as fatal for the current run.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
