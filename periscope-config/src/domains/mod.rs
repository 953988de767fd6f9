//! Domain-specific configuration modules

pub mod agent;
pub mod execution;
pub mod pipeline;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Periscope configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PeriscopeConfig {
    /// Round-trip execution configuration
    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    /// Shared pipeline configuration
    #[serde(default)]
    pub pipeline: pipeline::PipelineConfig,

    /// Helper (agent) process configuration
    #[serde(default)]
    pub agent: agent::AgentConfig,
}

impl PeriscopeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.execution.validate()?;
        self.pipeline.validate()?;
        self.agent.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = PeriscopeConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PeriscopeConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_generate_sample() {
        let sample = PeriscopeConfig::generate_sample();
        assert!(sample.contains("execution"));
        assert!(sample.contains("pipeline"));
        assert!(sample.contains("agent"));
    }
}
