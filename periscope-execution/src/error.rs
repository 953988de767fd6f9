//! Error taxonomy of the controller side

use thiserror::Error;

/// Failures surfaced by [`crate::AgentExecutor`]
///
/// Transport-layer failures are resolved (retried or escalated) inside
/// the orchestrator; what crosses back to the caller is exactly one of
/// these, and no partial result ever accompanies an error.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Debug-attach support unavailable on this runtime or platform;
    /// determined once at process start, never retried
    #[error("Debug-attach support is not available: {0}")]
    NotEnabled(String),

    /// The helper could not attach to the target process
    #[error("Attaching to process {pid} failed (escalated: {escalated})")]
    AttachFailed { pid: u32, escalated: bool },

    /// The target's debug runtime never became ready within the timeout
    #[error("Target runtime not ready after {waited_ms} ms")]
    TargetNotReady { waited_ms: u64 },

    /// The result did not fit any permissible pipeline capacity
    #[error("Pipeline overflow: result needs {required} bytes, capacity limit is {max}")]
    PipelineOverflow { required: u64, max: u64 },

    /// The worker itself failed; the cause is relayed verbatim and the
    /// call is never retried
    #[error("Remote worker '{worker_id}' failed: {message}")]
    Remote { worker_id: String, message: String },

    /// Malformed or unexpected helper behavior (crash exit codes, stderr
    /// noise, undecodable frames)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] periscope_config::ConfigError),
}

impl From<periscope_ipc::IpcError> for ExecutionError {
    fn from(err: periscope_ipc::IpcError) -> Self {
        ExecutionError::Protocol(err.to_string())
    }
}

impl From<periscope_ipc::PipelineError> for ExecutionError {
    fn from(err: periscope_ipc::PipelineError) -> Self {
        ExecutionError::Protocol(err.to_string())
    }
}
