pub mod capacity;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod workload;

pub use capacity::{CapacityRecord, CapacityTable};
pub use config::{
    ReportConfig, ReportFormat, RunConfig, SizingConfig, DEFAULT_INPUT_LENGTH,
    DEFAULT_OUTPUT_LENGTH, DEFAULT_REPORT_INTERVAL_SECS,
};
pub use endpoint::normalize_endpoint;
pub use error::{CacheBurnError, Result};
pub use metrics::{DecodePair, LatencyAverages, PrefillPair, RequestStats, StatsSnapshot};
pub use workload::WorkloadConfig;
