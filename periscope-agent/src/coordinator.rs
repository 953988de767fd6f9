//! Helper-side state machine: Idle → Attaching → Polling → Ready →
//! Executing → Responding → Done, terminal failure state Failed.
//!
//! The dual-channel discipline lives here: attach failures exit with the
//! reserved code because the controller may not be reading the response
//! stream yet; every fault after a successful attach travels as an
//! `Error` frame on the response stream and the process exits 0.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use periscope_ipc::{
    inline_limit, recv_frame, send_frame, AgentFault, AgentRequest, AgentResponse,
    MessageEnvelope, PipelineError, ResultEnvelope, SharedPipeline, ATTACH_FAILED_EXIT_CODE,
    SUCCESS_EXIT_CODE,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::attach::{AttachSlot, Attacher, TargetSession};
use crate::capture::ConsoleCapture;
use crate::registry::WorkerRegistry;
use crate::worker::WorkerContext;

/// Exit code for faults before the response frame could be written,
/// other than attach failure
const PROTOCOL_FAULT_EXIT_CODE: i32 = 1;

pub struct AttachCoordinator {
    attacher: Arc<dyn Attacher>,
    registry: WorkerRegistry,
}

impl AttachCoordinator {
    pub fn new(attacher: Arc<dyn Attacher>, registry: WorkerRegistry) -> Self {
        Self { attacher, registry }
    }

    /// Serve exactly one request from `request_stream`, writing the
    /// response to `response_stream`; returns the process exit code.
    pub async fn run<R, W>(&self, request_stream: &mut R, response_stream: &mut W) -> i32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let request = match recv_frame::<_, AgentRequest>(request_stream).await {
            Ok(envelope) => envelope.message,
            Err(err) => {
                debug!(%err, "undecodable request");
                return PROTOCOL_FAULT_EXIT_CODE;
            }
        };
        debug!(
            pid = request.target_pid,
            worker_id = %request.worker_id,
            "request received"
        );

        // Attaching happens on a dedicated thread: the underlying calls
        // can hang, and a hung attach must not keep the polling loop
        // from timing out.
        let slot = Arc::new(AttachSlot::new());
        {
            let slot = Arc::clone(&slot);
            let attacher = Arc::clone(&self.attacher);
            let pid = request.target_pid;
            std::thread::spawn(move || slot.fulfill(attacher.attach(pid)));
        }

        let timeout = Duration::from_millis(request.timeout_ms);
        let interval = Duration::from_millis(request.poll_interval_ms.max(1));
        let started = Instant::now();

        let mut session = loop {
            match slot.take() {
                Some(Ok(session)) => break session,
                Some(Err(err)) => {
                    debug!(%err, "attach failed");
                    return ATTACH_FAILED_EXIT_CODE;
                }
                None => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        let fault = AgentFault::TargetNotReady {
                            waited_ms: waited.as_millis() as u64,
                        };
                        return respond(response_stream, AgentResponse::Error { fault }).await;
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        };

        let response = self.serve(&request, session.as_ref());
        let code = respond(response_stream, response).await;
        session.detach();
        code
    }

    /// Executing and Responding; everything in here reports through the
    /// response channel
    fn serve(&self, request: &AgentRequest, session: &dyn TargetSession) -> AgentResponse {
        let Some(worker) = self.registry.get(&request.worker_id) else {
            return AgentResponse::Error {
                fault: AgentFault::UnknownWorker {
                    id: request.worker_id.clone(),
                },
            };
        };

        let capture = match ConsoleCapture::install() {
            Ok(capture) => capture,
            Err(err) => return internal(format!("console capture: {}", err)),
        };
        let ctx = WorkerContext::new(&request.param, session);
        let outcome = catch_unwind(AssertUnwindSafe(|| worker.run(&ctx)));
        let output = match capture.finish() {
            Ok(output) => output,
            Err(err) => return internal(format!("console restore: {}", err)),
        };

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                return AgentResponse::Error {
                    fault: AgentFault::WorkerFailed {
                        worker_id: request.worker_id.clone(),
                        message: err.to_string(),
                    },
                }
            }
            Err(payload) => {
                return AgentResponse::Error {
                    fault: AgentFault::WorkerFailed {
                        worker_id: request.worker_id.clone(),
                        message: panic_message(payload),
                    },
                }
            }
        };

        let envelope = ResultEnvelope::new(value, output.stdout, output.stderr);
        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => return internal(format!("result serialization: {}", err)),
        };
        let data_len = bytes.len() as u64;

        if data_len <= inline_limit(request.pipeline_capacity) {
            return AgentResponse::Inline { envelope };
        }

        let mut pipeline =
            match SharedPipeline::open(&request.pipeline_path, request.pipeline_capacity) {
                Ok(pipeline) => pipeline,
                Err(err) => return internal(format!("pipeline open: {}", err)),
            };
        match pipeline.write(&bytes) {
            Ok(()) => {
                pipeline.release();
                AgentResponse::Pipeline { data_len }
            }
            Err(PipelineError::Overflow { required, capacity }) => AgentResponse::Error {
                fault: AgentFault::PipelineOverflow { required, capacity },
            },
            Err(err) => internal(format!("pipeline write: {}", err)),
        }
    }
}

fn internal(message: String) -> AgentResponse {
    AgentResponse::Error {
        fault: AgentFault::Internal { message },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

async fn respond<W>(response_stream: &mut W, response: AgentResponse) -> i32
where
    W: AsyncWrite + Unpin,
{
    match send_frame(response_stream, &MessageEnvelope::new(response)).await {
        Ok(()) => SUCCESS_EXIT_CODE,
        Err(err) => {
            debug!(%err, "failed to write response");
            PROTOCOL_FAULT_EXIT_CODE
        }
    }
}
