//! Inter-process plumbing for Periscope
//!
//! This crate defines the wire protocol spoken between the controller and
//! the short-lived agent process, the framing over the agent's standard
//! streams, and the memory-mapped file pipeline used to move results that
//! are too large for the response stream.

pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::{IpcError, PipelineError};
pub use pipeline::SharedPipeline;
pub use protocol::{
    inline_limit, AgentFault, AgentRequest, AgentResponse, MessageEnvelope, ResultEnvelope,
    AGENT_MODE_ENV, ATTACH_FAILED_EXIT_CODE, BENIGN_STDERR_PREFIX, PROTOCOL_VERSION,
    SUCCESS_EXIT_CODE,
};
pub use transport::{recv_frame, send_frame};
