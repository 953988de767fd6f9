//! Wire protocol definitions shared by the controller and the agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Exit code of a helper that completed its round trip
pub const SUCCESS_EXIT_CODE: i32 = 0;

/// Reserved exit code meaning "attach to the target failed".
///
/// This is a protocol-level signal, not an OS convention: attach happens
/// before the controller starts reading the response stream, so the exit
/// code is the only channel guaranteed to be observable for that failure.
pub const ATTACH_FAILED_EXIT_CODE: i32 = 128;

/// Stderr lines starting with this prefix are tolerated; anything else on
/// the helper's stderr is treated as a hard transport failure.
pub const BENIGN_STDERR_PREFIX: &str = "WARNING";

/// Environment flag marking a helper invocation.
///
/// A binary that embeds the controller checks this flag first thing in
/// `main` and routes into the agent entrypoint instead of re-running its
/// own controller initialization.
pub const AGENT_MODE_ENV: &str = "PERISCOPE_AGENT_MODE";

/// Ceiling for inline responses regardless of pipeline capacity.
///
/// The controller reaps the helper before draining its stdout, so an
/// inline response frame must stay well inside the OS pipe buffer.
const INLINE_LIMIT_CEILING: u64 = 16 * 1024;

/// Largest serialized envelope that travels inline for a given pipeline
/// capacity; anything bigger goes through the pipeline.
pub fn inline_limit(pipeline_capacity: u64) -> u64 {
    (pipeline_capacity / 2).min(INLINE_LIMIT_CEILING)
}

/// One unit of work for the agent process
///
/// Created once per invocation by the orchestrator and consumed exactly
/// once by the coordinator inside the helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Process to attach to; already resolved, never a sentinel
    pub target_pid: u32,
    /// Registry identifier of the worker to run
    pub worker_id: String,
    /// Opaque worker parameter
    pub param: JsonValue,
    /// Readiness-polling deadline inside the helper
    pub timeout_ms: u64,
    /// Pause between readiness checks
    pub poll_interval_ms: u64,
    /// Backing file of the shared pipeline
    pub pipeline_path: PathBuf,
    /// Capacity both sides map; fixed for the lifetime of the mapping
    pub pipeline_capacity: u64,
}

/// The worker's return value plus everything it printed while running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub value: JsonValue,
    pub stdout: String,
    pub stderr: String,
}

impl ResultEnvelope {
    pub fn new(value: JsonValue, stdout: String, stderr: String) -> Self {
        Self {
            value,
            stdout,
            stderr,
        }
    }
}

/// Response written by the agent on its stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    /// Small result, carried directly in the frame
    Inline { envelope: ResultEnvelope },

    /// Large result: `data_len` bytes were written into the pipeline
    Pipeline { data_len: u64 },

    /// The round trip failed after attach; the cause travels here
    Error { fault: AgentFault },
}

/// Faults the agent can report on the response channel
///
/// Attach failures are absent by design: they are signalled through the
/// reserved exit code because the response channel may not be readable
/// yet when attach fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum AgentFault {
    /// The target's debug runtime never became ready within the timeout
    TargetNotReady { waited_ms: u64 },

    /// The serialized result did not fit the pipeline mapping
    PipelineOverflow { required: u64, capacity: u64 },

    /// The worker itself failed; the message is relayed verbatim
    WorkerFailed { worker_id: String, message: String },

    /// No worker registered under the requested id
    UnknownWorker { id: String },

    /// Agent-internal failure (pipeline open, codec, ...)
    Internal { message: String },
}

impl fmt::Display for AgentFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentFault::TargetNotReady { waited_ms } => {
                write!(f, "target runtime not ready after {} ms", waited_ms)
            }
            AgentFault::PipelineOverflow { required, capacity } => {
                write!(
                    f,
                    "pipeline overflow: {} bytes do not fit capacity {}",
                    required, capacity
                )
            }
            AgentFault::WorkerFailed { worker_id, message } => {
                write!(f, "worker '{}' failed: {}", worker_id, message)
            }
            AgentFault::UnknownWorker { id } => write!(f, "no worker registered as '{}'", id),
            AgentFault::Internal { message } => write!(f, "agent internal error: {}", message),
        }
    }
}

impl std::error::Error for AgentFault {}

/// Envelope for all frames on the request and response streams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}
