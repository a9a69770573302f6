//! In-memory completion backend for engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cacheburn_core::{CacheBurnError, Result};
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::{CompletionBackend, FragmentStream};

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Replays the same fragments for every request and records how many
/// streams were open at once.
pub struct ScriptedBackend {
    fragments: Vec<Option<String>>,
    first_fragment_delay: Duration,
    fail_after: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(fragments: Vec<Option<&str>>) -> Self {
        Self {
            fragments: fragments.into_iter().map(|f| f.map(str::to_string)).collect(),
            first_fragment_delay: Duration::ZERO,
            fail_after: None,
            cancel_after: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_first_fragment_delay(mut self, delay: Duration) -> Self {
        self.first_fragment_delay = delay;
        self
    }

    /// Emit a stream error after `n` fragments.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Cancel `token` once `calls` requests have been started.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(
        &self,
        _model: &str,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<FragmentStream> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());

        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if calls >= *limit {
                token.cancel();
            }
        }

        let mut items: Vec<Result<Option<String>>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(CacheBurnError::Stream("connection reset".to_string())));
        }

        let first_delay = self.first_fragment_delay;
        let fragments = stream::iter(items.into_iter().enumerate())
            .then(move |(i, item)| async move {
                if i == 0 && !first_delay.is_zero() {
                    tokio::time::sleep(first_delay).await;
                }
                item
            })
            .map(move |item| {
                let _held = &guard;
                item
            });

        Ok(Box::pin(fragments))
    }
}
