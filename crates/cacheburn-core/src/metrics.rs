use crate::{CacheBurnError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Timing of one completed streaming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStats {
    start_time: Instant,
    first_token_time: Instant,
    end_time: Instant,
    input_length: usize,
    output_length: usize,
}

impl RequestStats {
    /// Fails with `EmptyResponse` when no content ever arrived, so a
    /// record without a first token cannot reach the aggregator.
    pub fn new(
        start_time: Instant,
        first_token_time: Option<Instant>,
        end_time: Instant,
        input_length: usize,
        output_length: usize,
    ) -> Result<Self> {
        let first_token_time = first_token_time.ok_or(CacheBurnError::EmptyResponse)?;
        Ok(Self {
            start_time,
            first_token_time,
            end_time,
            input_length,
            output_length,
        })
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn first_token_time(&self) -> Instant {
        self.first_token_time
    }

    pub fn end_time(&self) -> Instant {
        self.end_time
    }

    pub fn input_length(&self) -> usize {
        self.input_length
    }

    pub fn output_length(&self) -> usize {
        self.output_length
    }

    pub fn prefill_time(&self) -> Duration {
        self.first_token_time.saturating_duration_since(self.start_time)
    }

    pub fn decode_time(&self) -> Duration {
        self.end_time.saturating_duration_since(self.first_token_time)
    }

    pub fn prefill_pair(&self) -> PrefillPair {
        PrefillPair {
            input_length: self.input_length,
            prefill_time: self.prefill_time().as_secs_f64(),
        }
    }

    pub fn decode_pair(&self) -> DecodePair {
        DecodePair {
            output_length: self.output_length,
            decode_time: self.decode_time().as_secs_f64(),
        }
    }
}

/// Prompt length against seconds until the first token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefillPair {
    pub input_length: usize,
    pub prefill_time: f64,
}

/// Generated length against seconds from first token to end of stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodePair {
    pub output_length: usize,
    pub decode_time: f64,
}

/// TTFT and ITL in seconds, throughputs in characters per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyAverages {
    pub ttft: f64,
    pub itl: f64,
    pub prefill_throughput: f64,
    pub decode_throughput: f64,
}

/// One periodic report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub elapsed_secs: f64,
    pub total_requests: u64,
    pub total_failed: u64,
    pub qps: f64,
    pub running: LatencyAverages,
    pub interval_secs: u64,
    pub interval_requests: u64,
    pub interval_failed: u64,
    /// `None` when only failures completed during the interval
    pub interval: Option<LatencyAverages>,
}

impl StatsSnapshot {
    pub fn error_rate(&self) -> f64 {
        let attempted = self.total_requests + self.total_failed;
        match attempted {
            0 => 0.0,
            n => self.total_failed as f64 / n as f64,
        }
    }
}
