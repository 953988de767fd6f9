//! IPC error types

use thiserror::Error;

/// Framing and codec errors on the request/response streams
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Stream closed before a complete frame arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol version mismatch
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::Io(err.to_string())
        } else if err.is_data() {
            IpcError::Deserialization(err.to_string())
        } else {
            IpcError::Serialization(err.to_string())
        }
    }
}

/// Shared pipeline errors
///
/// `Overflow` is deliberately its own variant: the orchestrator retries
/// overflowing calls with a larger mapping and must be able to tell an
/// overflow apart from every other failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The payload does not fit the fixed mapping
    #[error("Pipeline overflow: {required} bytes do not fit capacity {capacity}")]
    Overflow { required: u64, capacity: u64 },

    /// Both sides must map the identical capacity
    #[error("Pipeline capacity mismatch: file holds {actual} bytes, expected at least {expected}")]
    CapacityMismatch { expected: u64, actual: u64 },

    /// Read length exceeding the mapping
    #[error("Pipeline read of {requested} bytes exceeds capacity {capacity}")]
    BadReadLength { requested: u64, capacity: u64 },

    /// Capacity does not fit the platform's address space
    #[error("Pipeline capacity {0} is not addressable on this platform")]
    CapacityUnaddressable(u64),

    /// Backing file IO error
    #[error("Pipeline IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for the one failure the orchestrator may retry with a
    /// doubled capacity
    pub fn is_overflow(&self) -> bool {
        matches!(self, PipelineError::Overflow { .. })
    }
}
