//! Shared pipeline configuration

use crate::error::ConfigResult;
use crate::validation::{validate_ordered_pair, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default pipeline capacity: 16 KiB
pub const DEFAULT_PIPELINE_CAPACITY: u64 = 16 * 1024;

/// Default maximum pipeline capacity: 256 MiB
pub const DEFAULT_MAX_PIPELINE_CAPACITY: u64 = 256 * 1024 * 1024;

/// Configuration of the memory-mapped result pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the first pipeline mapping for a call
    #[serde(default = "default_capacity")]
    pub initial_capacity: u64,

    /// Upper bound on the capacity reached by doubling retries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Whether overflowing calls are retried with a doubled capacity
    #[serde(default = "crate::domains::utils::default_true")]
    pub expandable: bool,

    /// Directory for the backing temp files; system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
            max_capacity: default_max_capacity(),
            expandable: true,
            spool_dir: None,
        }
    }
}

impl Validatable for PipelineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.initial_capacity, "initial_capacity", self.domain_name())?;
        validate_positive(self.max_capacity, "max_capacity", self.domain_name())?;
        validate_ordered_pair(
            self.initial_capacity,
            self.max_capacity,
            "initial_capacity",
            "max_capacity",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "pipeline"
    }
}

fn default_capacity() -> u64 {
    DEFAULT_PIPELINE_CAPACITY
}

fn default_max_capacity() -> u64 {
    DEFAULT_MAX_PIPELINE_CAPACITY
}
