//! Worker trait and execution context

use std::io;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::attach::TargetSession;

/// Failures a worker may report; relayed verbatim to the controller
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What a worker sees of the round trip: its parameter and the live
/// attach session
pub struct WorkerContext<'a> {
    param: &'a JsonValue,
    session: &'a dyn TargetSession,
}

impl<'a> WorkerContext<'a> {
    pub fn new(param: &'a JsonValue, session: &'a dyn TargetSession) -> Self {
        Self { param, session }
    }

    pub fn param(&self) -> &JsonValue {
        self.param
    }

    pub fn target_pid(&self) -> u32 {
        self.session.pid()
    }

    pub fn session(&self) -> &dyn TargetSession {
        self.session
    }
}

/// One unit of work executed inside the helper against the stopped
/// target.
///
/// Implementations must be cheap to construct and free of global state:
/// a worker runs at most once per helper process. Panics are caught by
/// the coordinator and reported as remote faults.
pub trait Worker: Send + Sync {
    /// Registry identifier, conventionally `namespace.name`
    fn id(&self) -> &'static str;

    fn run(&self, ctx: &WorkerContext<'_>) -> Result<JsonValue, WorkerError>;
}
