use std::sync::Arc;
use std::time::Instant;

use cacheburn_core::{CacheBurnError, RequestStats, Result};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::CompletionBackend;

/// Runs one streaming completion and times it.
pub struct RequestExecutor<B: ?Sized> {
    backend: Arc<B>,
    model: String,
    max_tokens: u32,
}

impl<B: CompletionBackend + ?Sized> RequestExecutor<B> {
    pub fn new(backend: Arc<B>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens,
        }
    }

    /// Stream a completion for `prompt`, returning `Cancelled` as soon as
    /// `cancel` fires. Failures are not retried.
    pub async fn execute(&self, prompt: &str, cancel: &CancellationToken) -> Result<RequestStats> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheBurnError::Cancelled),
            stats = self.stream(prompt) => stats,
        }
    }

    async fn stream(&self, prompt: &str) -> Result<RequestStats> {
        let start_time = Instant::now();
        let mut first_token_time = None;

        let mut fragments = self
            .backend
            .stream_completion(&self.model, prompt, self.max_tokens)
            .await?;

        let mut output = String::new();
        while let Some(fragment) = fragments.next().await {
            let Some(content) = fragment? else { continue };
            if first_token_time.is_none() {
                first_token_time = Some(Instant::now());
            }
            output.push_str(&content);
        }

        let end_time = Instant::now();
        let input_length = prompt.chars().count();
        let output_length = output.chars().count();
        debug!(
            input_length,
            output_length,
            elapsed_ms = end_time.duration_since(start_time).as_millis() as u64,
            "request finished"
        );

        RequestStats::new(start_time, first_token_time, end_time, input_length, output_length)
    }
}
