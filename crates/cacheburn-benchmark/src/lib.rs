pub mod aggregator;
pub mod client;
pub mod executor;
pub mod pool;
pub mod report;
pub mod runner;

#[cfg(test)]
mod testing;

pub use aggregator::{run_aggregator, RequestEvent, StatsAggregator};
pub use client::{discover_model, list_models, CompletionBackend, FragmentStream, OpenAiBackend};
pub use executor::RequestExecutor;
pub use pool::{Prompt, PromptPool};
pub use runner::WorkloadGenerator;
