//! One-shot discovery of debug-attach capability
//!
//! Discovery is pure observation: it inspects the platform and the
//! configuration but changes nothing. The result is computed once and
//! carried by the executor for its whole lifetime; a disabled
//! environment stays disabled.

use std::path::PathBuf;

use periscope_config::AgentConfig;
use tracing::debug;

use crate::error::ExecutionError;

/// Snapshot of the runtime's debug-attach capability
#[derive(Debug, Clone)]
pub struct Environment {
    enabled: bool,
    disable_reason: Option<String>,
    current_pid: u32,
    agent_program: PathBuf,
    escalation_supported: bool,
}

impl Environment {
    /// Probe the current process and platform
    pub fn discover(config: &AgentConfig) -> Self {
        let current_pid = std::process::id();
        let escalation_supported = cfg!(unix);

        let mut disable_reason = None;
        if !config.enabled {
            disable_reason = Some("disabled by configuration".to_string());
        } else if !cfg!(target_os = "linux") {
            disable_reason = Some("debug attach requires Linux ptrace".to_string());
        }

        // The helper is this very executable re-invoked in agent mode,
        // unless an explicit program path overrides it.
        let agent_program = match &config.program {
            Some(program) => program.clone(),
            None => match std::env::current_exe() {
                Ok(path) => path,
                Err(err) => {
                    if disable_reason.is_none() {
                        disable_reason =
                            Some(format!("cannot resolve current executable: {}", err));
                    }
                    PathBuf::new()
                }
            },
        };

        let enabled = disable_reason.is_none();
        debug!(
            enabled,
            current_pid,
            agent_program = %agent_program.display(),
            "environment discovered"
        );

        Self {
            enabled,
            disable_reason,
            current_pid,
            agent_program,
            escalation_supported,
        }
    }

    /// Whether debug-attach execution can be attempted at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fail fast when the environment does not support attach
    pub fn ensure_enabled(&self) -> Result<(), ExecutionError> {
        if self.enabled {
            Ok(())
        } else {
            let reason = self
                .disable_reason
                .clone()
                .unwrap_or_else(|| "unknown reason".to_string());
            Err(ExecutionError::NotEnabled(reason))
        }
    }

    /// Pid of the controller process, the default attach target
    pub fn current_pid(&self) -> u32 {
        self.current_pid
    }

    /// Program spawned as the helper
    pub fn agent_program(&self) -> &PathBuf {
        &self.agent_program
    }

    /// Whether a `sudo` retry is even possible on this platform
    pub fn escalation_supported(&self) -> bool {
        self.escalation_supported
    }
}
