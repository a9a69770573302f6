use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target prompt length in characters
pub const DEFAULT_INPUT_LENGTH: usize = 32_000;

/// Target number of generated tokens per request
pub const DEFAULT_OUTPUT_LENGTH: u32 = 100;

/// Seconds between statistics reports
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "table" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Share of the offload buffer assumed usable after fragmentation
    pub conservative_ratio: f64,
    /// Concurrency is capped at `num_contexts / inflight_divisor`
    pub inflight_divisor: usize,
    pub input_length: usize,
    pub output_length: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            conservative_ratio: 0.9,
            inflight_divisor: 3,
            input_length: DEFAULT_INPUT_LENGTH,
            output_length: DEFAULT_OUTPUT_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub interval_secs: u64,
    #[serde(default)]
    pub format: ReportFormat,
}

impl ReportConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            format: ReportFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Normalized OpenAI-compatible base URL, ending in `/v1/`
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl RunConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            sizing: SizingConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_workload() {
        let config = RunConfig::new("http://localhost:8000/v1/", "key");
        assert_eq!(config.sizing.input_length, 32_000);
        assert_eq!(config.sizing.output_length, 100);
        assert_eq!(config.sizing.inflight_divisor, 3);
        assert_eq!(config.report.interval(), Duration::from_secs(5));
        assert_eq!(config.report.format, ReportFormat::Text);
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("table"), Some(ReportFormat::Text));
        assert_eq!(ReportFormat::parse("csv"), None);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let report = ReportConfig {
            interval_secs: 0,
            format: ReportFormat::Json,
        };
        assert_eq!(report.interval(), Duration::from_secs(1));
    }
}
