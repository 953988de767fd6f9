//! Round-trip execution configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution configuration for a single helper round trip
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// How long the helper waits for the target's debug runtime to
    /// become ready before giving up
    #[serde(with = "crate::domains::utils::serde_duration_ms", default = "default_timeout")]
    pub default_timeout: Duration,

    /// Interval between readiness checks inside the helper
    #[serde(with = "crate::domains::utils::serde_duration_ms", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Extra time the controller grants the helper beyond the request
    /// timeout before destroying it
    #[serde(with = "crate::domains::utils::serde_duration_ms", default = "default_reap_grace")]
    pub reap_grace_period: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            reap_grace_period: default_reap_grace(),
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.default_timeout.as_millis(),
            "default_timeout",
            self.domain_name(),
        )?;
        validate_positive(
            self.poll_interval.as_millis(),
            "poll_interval",
            self.domain_name(),
        )?;
        if self.poll_interval > self.default_timeout {
            return Err(self.validation_error(format!(
                "poll_interval ({:?}) cannot exceed default_timeout ({:?})",
                self.poll_interval, self.default_timeout
            )));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_reap_grace() -> Duration {
    Duration::from_millis(10_000)
}
