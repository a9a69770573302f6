use crate::capacity::CapacityRecord;
use crate::config::SizingConfig;
use crate::{CacheBurnError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const GIB: f64 = (1u64 << 30) as f64;

/// Immutable description of the synthetic workload, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub num_contexts: usize,
    pub questions_per_context: usize,
    pub model_name: String,
    pub max_inflight_requests: usize,
    /// Target prompt length in characters
    pub input_length: usize,
    /// Max tokens requested per completion
    pub output_length: u32,
}

impl WorkloadConfig {
    /// Size a workload whose distinct contexts would together fill the
    /// usable part of the largest offload buffer.
    pub fn from_capacity(record: &CapacityRecord, sizing: &SizingConfig) -> Result<Self> {
        if record.bytes_per_tok == 0 {
            return Err(CacheBurnError::Config(format!(
                "bytes_per_tok must be positive for {}",
                record.model_name
            )));
        }
        if sizing.input_length == 0 || sizing.inflight_divisor == 0 {
            return Err(CacheBurnError::Config(
                "input length and inflight divisor must be positive".to_string(),
            ));
        }

        let offload_size = record.offload_size();
        tracing::debug!("offload_size: {} GiB", offload_size);

        let gib_per_context = record.bytes_per_tok as f64 * sizing.input_length as f64 / GIB;
        let num_contexts = (sizing.conservative_ratio * offload_size as f64 / gib_per_context)
            .floor()
            .max(0.0) as usize;

        Ok(Self {
            num_contexts,
            questions_per_context: num_contexts,
            model_name: record.model_name.clone(),
            max_inflight_requests: num_contexts / sizing.inflight_divisor,
            input_length: sizing.input_length,
            output_length: sizing.output_length,
        })
    }

    /// A workload that can actually be driven: at least one context to
    /// rotate through and at least one concurrency permit.
    pub fn validate(&self) -> Result<()> {
        if self.num_contexts == 0 || self.questions_per_context == 0 {
            return Err(CacheBurnError::Config(format!(
                "offload buffer for {} is too small to hold a single context",
                self.model_name
            )));
        }
        if self.max_inflight_requests == 0 {
            return Err(CacheBurnError::Config(format!(
                "{} contexts leave no room for an in-flight request",
                self.num_contexts
            )));
        }
        Ok(())
    }
}

impl fmt::Display for WorkloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workload Specifications:")?;
        writeln!(f, "Model: {}", self.model_name)?;
        writeln!(f, "Number of Contexts: {}", self.num_contexts)?;
        writeln!(f, "Number of Questions per Context: {}", self.questions_per_context)?;
        writeln!(
            f,
            "Max Inflight Requests (Load-Balancing): {}",
            self.max_inflight_requests
        )?;
        writeln!(f, "Input Length: {}", self.input_length)?;
        writeln!(f, "Output Length: {}", self.output_length)
    }
}
