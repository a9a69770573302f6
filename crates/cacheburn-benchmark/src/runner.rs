use std::sync::Arc;

use cacheburn_core::{CacheBurnError, ReportConfig, Result, WorkloadConfig};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::{run_aggregator, RequestEvent, StatsAggregator};
use crate::client::CompletionBackend;
use crate::executor::RequestExecutor;
use crate::pool::PromptPool;

/// Closed-loop load generator: keeps exactly `max_inflight_requests`
/// streaming requests in flight until cancelled.
pub struct WorkloadGenerator<B: ?Sized> {
    workload: WorkloadConfig,
    executor: Arc<RequestExecutor<B>>,
    pool: PromptPool,
    semaphore: Arc<Semaphore>,
}

impl<B: CompletionBackend + ?Sized + 'static> WorkloadGenerator<B> {
    pub fn new(workload: WorkloadConfig, backend: Arc<B>) -> Result<Self> {
        let pool = PromptPool::generate(
            workload.num_contexts,
            workload.input_length,
            workload.questions_per_context,
        );
        Self::with_pool(workload, backend, pool)
    }

    pub fn with_pool(workload: WorkloadConfig, backend: Arc<B>, pool: PromptPool) -> Result<Self> {
        workload.validate()?;
        if pool.num_contexts() == 0 || pool.num_questions() == 0 {
            return Err(CacheBurnError::Config("prompt pool is empty".to_string()));
        }

        let executor = RequestExecutor::new(backend, &workload.model_name, workload.output_length);
        let semaphore = Arc::new(Semaphore::new(workload.max_inflight_requests));

        Ok(Self {
            workload,
            executor: Arc::new(executor),
            pool,
            semaphore,
        })
    }

    pub fn workload(&self) -> &WorkloadConfig {
        &self.workload
    }

    /// Dispatch loop. Every iteration waits for a permit, then spawns one
    /// executor that holds the permit until it finishes, however it
    /// finishes. Returns the number of dispatched requests once `cancel`
    /// fires and every in-flight request has wound down.
    #[instrument(skip_all, fields(model = %self.workload.model_name, max_inflight = self.workload.max_inflight_requests))]
    pub async fn dispatch(
        &mut self,
        events: mpsc::UnboundedSender<RequestEvent>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        info!("Starting dispatch loop");
        let mut dispatched = 0u64;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| CacheBurnError::Cancelled)?
                }
            };

            let Some(prompt) = self.pool.next_prompt() else {
                return Err(CacheBurnError::Config("prompt pool is empty".to_string()));
            };
            dispatched += 1;
            debug!(
                request = dispatched,
                context = prompt.context_index,
                question = prompt.question_index,
                "dispatching"
            );

            let executor = self.executor.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let event = match executor.execute(&prompt.text, &cancel).await {
                    Ok(stats) => RequestEvent::Finished(stats),
                    Err(CacheBurnError::Cancelled) => return,
                    Err(e) => {
                        warn!("Request failed: {}", e);
                        RequestEvent::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                // aggregator gone means we are shutting down
                let _ = events.send(event);
            });
        }

        info!(dispatched, "Dispatch stopped, waiting for in-flight requests");
        let all = u32::try_from(self.workload.max_inflight_requests).unwrap_or(u32::MAX);
        let _drained = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|_| CacheBurnError::Cancelled)?;

        Ok(dispatched)
    }

    /// Run the dispatcher and the periodic aggregator together until
    /// `cancel` fires, then return the final statistics.
    pub async fn run(mut self, report: &ReportConfig, cancel: CancellationToken) -> Result<StatsAggregator> {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = StatsAggregator::new(report.interval());
        let reporter = tokio::spawn(run_aggregator(aggregator, rx, report.format));

        let dispatched = self.dispatch(tx, cancel).await?;
        debug!(dispatched, "Dispatcher finished");

        reporter
            .await
            .map_err(|e| CacheBurnError::Config(format!("aggregator task failed: {}", e)))
    }
}
