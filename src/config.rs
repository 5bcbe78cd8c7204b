//! Summary run configuration

use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::{Result, SummaryError};

/// Records buffered per spill chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
/// Soft byte bound per aggregation batch
pub const DEFAULT_MAX_BATCH_BYTES: usize = 8 * 1024 * 1024;
/// Inputs up to this size take the in-memory path under `Strategy::Auto`
pub const DEFAULT_IN_MEMORY_THRESHOLD: u64 = 64 * 1024 * 1024;

/// How the summary is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// In-memory for inputs up to the threshold, external otherwise
    #[default]
    Auto,
    /// Single pass, one map entry per distinct key
    InMemory,
    /// External sort + boundary-aware batching (bounded memory)
    External,
}

impl Strategy {
    /// Resolve `Auto` against the input size; unknown size means external
    pub fn resolve(self, input_len: Option<u64>, threshold: u64) -> Strategy {
        match self {
            Strategy::Auto => match input_len {
                Some(len) if len <= threshold => Strategy::InMemory,
                _ => Strategy::External,
            },
            other => other,
        }
    }
}

/// Which engine produces the sorted stream on the external path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortBackend {
    /// Chunk partitioner + k-way merge
    #[default]
    InProcess,
    /// `sort` executable with byte collation
    System,
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub chunk_size: usize,
    pub max_batch_bytes: usize,
    /// Parent directory for spill directories
    pub temp_dir: PathBuf,
    pub strategy: Strategy,
    pub in_memory_threshold: u64,
    pub sort_backend: SortBackend,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            temp_dir: std::env::temp_dir(),
            strategy: Strategy::default(),
            in_memory_threshold: DEFAULT_IN_MEMORY_THRESHOLD,
            sort_backend: SortBackend::default(),
        }
    }
}

impl SummaryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SummaryError::InvalidOptions("chunk_size must be positive".into()));
        }
        if self.max_batch_bytes == 0 {
            return Err(SummaryError::InvalidOptions(
                "max_batch_bytes must be positive".into(),
            ));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(SummaryError::InvalidOptions("temp_dir must not be empty".into()));
        }
        Ok(())
    }
}
