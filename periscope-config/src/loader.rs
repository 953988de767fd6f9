//! Configuration loading and environment variable handling

use crate::domains::PeriscopeConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "PERISCOPE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<PeriscopeConfig> {
        log::debug!("loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        let mut config: PeriscopeConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<PeriscopeConfig> {
        let mut config = PeriscopeConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<PeriscopeConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut PeriscopeConfig) -> ConfigResult<()> {
        if let Ok(timeout) = self.get_env_var("TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid TIMEOUT_MS: {}", e)))?;
            config.execution.default_timeout = Duration::from_millis(millis);
        }

        if let Ok(interval) = self.get_env_var("POLL_INTERVAL_MS") {
            let millis: u64 = interval
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid POLL_INTERVAL_MS: {}", e)))?;
            config.execution.poll_interval = Duration::from_millis(millis);
        }

        if let Ok(capacity) = self.get_env_var("PIPELINE_CAPACITY") {
            config.pipeline.initial_capacity = capacity
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PIPELINE_CAPACITY: {}", e)))?;
        }

        if let Ok(max) = self.get_env_var("MAX_PIPELINE_CAPACITY") {
            config.pipeline.max_capacity = max.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid MAX_PIPELINE_CAPACITY: {}", e))
            })?;
        }

        if let Ok(expandable) = self.get_env_var("PIPELINE_EXPANDABLE") {
            config.pipeline.expandable = expandable.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid PIPELINE_EXPANDABLE: {}", e))
            })?;
        }

        if let Ok(enabled) = self.get_env_var("AGENT_ENABLED") {
            config.agent.enabled = enabled
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid AGENT_ENABLED: {}", e)))?;
        }

        if let Ok(program) = self.get_env_var("AGENT_PROGRAM") {
            config.agent.program = Some(program.into());
        }

        if let Ok(sudo) = self.get_env_var("TRY_WITH_SUDO") {
            config.agent.try_with_sudo = sudo
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid TRY_WITH_SUDO: {}", e)))?;
        }

        Ok(())
    }

    /// Get an environment variable with the configured prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        let value = std::env::var(format!("{}_{}", self.prefix, name));
        if value.is_ok() {
            log::debug!("environment override {}_{} applied", self.prefix, name);
        }
        value
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
