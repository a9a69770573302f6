use crate::{CacheBurnError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

const BUILTIN_TABLE: &str = include_str!("../model_configs.json");

/// Server capacity for one model. Buffer sizes are in GiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub model_name: String,
    #[serde(rename = "tensorParallelSize", deserialize_with = "lenient_u64")]
    pub tensor_parallel_size: u64,
    #[serde(rename = "cpuOffloadingBufferSize", deserialize_with = "lenient_u64")]
    pub cpu_offloading_buffer_size: u64,
    #[serde(rename = "diskOffloadingBufferSize", deserialize_with = "lenient_u64")]
    pub disk_offloading_buffer_size: u64,
    #[serde(rename = "remoteOffloadingBufferSize", deserialize_with = "lenient_u64")]
    pub remote_offloading_buffer_size: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub bytes_per_tok: u64,
}

impl CapacityRecord {
    /// Largest offload tier: per-GPU tiers scale with TP, the remote tier is shared.
    pub fn offload_size(&self) -> u64 {
        let tp = self.tensor_parallel_size;
        (self.cpu_offloading_buffer_size * tp)
            .max(self.disk_offloading_buffer_size * tp)
            .max(self.remote_offloading_buffer_size)
    }
}

// Capacity files in the wild carry both `4` and `"4"`.
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapacityTable {
    records: Vec<CapacityRecord>,
}

impl CapacityTable {
    pub fn new(records: Vec<CapacityRecord>) -> Self {
        Self { records }
    }

    /// The table shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TABLE)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<CapacityRecord> = serde_json::from_str(json)?;
        Ok(Self { records })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let table = Self::from_json(&contents)?;
        tracing::debug!(
            "Loaded {} capacity records from {}",
            table.records.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn lookup(&self, model_name: &str) -> Result<&CapacityRecord> {
        self.records
            .iter()
            .find(|r| r.model_name == model_name)
            .ok_or_else(|| {
                CacheBurnError::ModelNotFound(format!("{} is not in the capacity table", model_name))
            })
    }

    pub fn records(&self) -> &[CapacityRecord] {
        &self.records
    }
}
