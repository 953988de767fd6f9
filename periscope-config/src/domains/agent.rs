//! Helper (agent) process configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration of the spawned helper process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch for debug-attach support
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    /// Path of the agent program; the current executable when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,

    /// Whether a failed attach may be retried once with `sudo`
    #[serde(default = "crate::domains::utils::default_false")]
    pub try_with_sudo: bool,

    /// Extra environment variables forwarded to the helper process
    #[serde(default)]
    pub extra_env: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            try_with_sudo: false,
            extra_env: HashMap::new(),
        }
    }
}

impl Validatable for AgentConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (key, _) in &self.extra_env {
            validate_required_string(key, "extra_env key", self.domain_name())?;
            if key.contains('=') {
                return Err(
                    self.validation_error(format!("extra_env key '{}' contains '='", key))
                );
            }
        }
        if let Some(program) = &self.program {
            if program.as_os_str().is_empty() {
                return Err(self.validation_error("program path cannot be empty"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "agent"
    }
}
