//! One round trip of the attach-execute protocol, plus its retry policy
//!
//! The orchestrator owns the controller half of the protocol: it creates
//! the shared pipeline, launches the helper, ships the request over its
//! stdin, reaps the process, and interprets exit code, stderr and the
//! response frame in that order. Two failures are retryable and handled
//! here: an attach failure triggers one privilege-escalated relaunch
//! (remembered for the rest of the process), and a pipeline overflow
//! triggers relaunches with doubled capacity up to the configured cap.
//!
//! The helper is reaped before its stdout is drained, which is why
//! inline responses are capped at [`periscope_ipc::inline_limit`]: a
//! frame that fits the OS pipe buffer cannot block the exiting helper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use periscope_config::PeriscopeConfig;
use periscope_ipc::{
    recv_frame, send_frame, AgentFault, AgentRequest, AgentResponse, MessageEnvelope,
    ResultEnvelope, SharedPipeline, ATTACH_FAILED_EXIT_CODE, BENIGN_STDERR_PREFIX,
    SUCCESS_EXIT_CODE,
};
use serde_json::Value as JsonValue;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::environment::Environment;
use crate::error::ExecutionError;
use crate::launcher::{AgentLauncher, LaunchSpec, ProcessLauncher};

/// Which process the helper attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProcess {
    /// The controller process itself
    Current,
    /// An explicit pid
    Pid(u32),
}

/// Per-call knobs; configuration defaults apply where unset
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub target: TargetProcess,
    pub timeout: Option<Duration>,
    pub pipeline_capacity: Option<u64>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            target: TargetProcess::Current,
            timeout: None,
            pipeline_capacity: None,
        }
    }
}

/// Worker result plus the console output captured while it ran
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub value: JsonValue,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    fn from_envelope(envelope: ResultEnvelope) -> Self {
        Self {
            value: envelope.value,
            stdout: envelope.stdout,
            stderr: envelope.stderr,
        }
    }

    /// Re-emit the worker's captured console output on this process's
    /// own stdout and stderr
    pub fn replay_console(&self) {
        if !self.stdout.is_empty() {
            print!("{}", self.stdout);
        }
        if !self.stderr.is_empty() {
            eprint!("{}", self.stderr);
        }
    }
}

/// Controller-side driver of agent invocations
///
/// One executor is meant to live as long as the controller process: it
/// discovers the environment once at construction and carries the
/// privilege-escalation memory across calls.
pub struct AgentExecutor<L: AgentLauncher = ProcessLauncher> {
    environment: Environment,
    config: PeriscopeConfig,
    launcher: L,
    // Flipped once an escalated attach succeeds; later calls start elevated.
    sudo_required: AtomicBool,
}

impl AgentExecutor<ProcessLauncher> {
    pub fn new(config: PeriscopeConfig) -> Self {
        Self::with_launcher(config, ProcessLauncher)
    }
}

impl<L: AgentLauncher> AgentExecutor<L> {
    pub fn with_launcher(config: PeriscopeConfig, launcher: L) -> Self {
        let environment = Environment::discover(&config.agent);
        Self {
            environment,
            config,
            launcher,
            sudo_required: AtomicBool::new(false),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Run one worker in the target process and return its result.
    ///
    /// Grows the pipeline and retries on overflow; all other errors are
    /// final. An error never carries a partial result.
    pub async fn execute(
        &self,
        worker_id: &str,
        param: JsonValue,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.environment.ensure_enabled()?;

        let pid = match options.target {
            TargetProcess::Current => self.environment.current_pid(),
            TargetProcess::Pid(pid) => pid,
        };
        let timeout = options
            .timeout
            .unwrap_or(self.config.execution.default_timeout);
        let mut capacity = options
            .pipeline_capacity
            .unwrap_or(self.config.pipeline.initial_capacity);
        let max_capacity = self.config.pipeline.max_capacity;

        loop {
            match self
                .round_trip(pid, worker_id, &param, timeout, capacity)
                .await
            {
                Ok(envelope) => return Ok(ExecutionOutcome::from_envelope(envelope)),
                Err(ExecutionError::PipelineOverflow { required, .. })
                    if self.config.pipeline.expandable =>
                {
                    let doubled = capacity.saturating_mul(2);
                    if doubled > max_capacity {
                        return Err(ExecutionError::PipelineOverflow {
                            required,
                            max: max_capacity,
                        });
                    }
                    warn!(
                        worker_id,
                        required, capacity, doubled, "pipeline overflow, retrying with doubled capacity"
                    );
                    capacity = doubled;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One protocol round trip, with the single-shot escalation retry
    async fn round_trip(
        &self,
        pid: u32,
        worker_id: &str,
        param: &JsonValue,
        timeout: Duration,
        capacity: u64,
    ) -> Result<ResultEnvelope, ExecutionError> {
        let elevate = self.sudo_required.load(Ordering::Relaxed);
        match self
            .attempt(pid, worker_id, param, timeout, capacity, elevate)
            .await
        {
            Err(ExecutionError::AttachFailed { .. })
                if !elevate
                    && self.environment.escalation_supported()
                    && self.config.agent.try_with_sudo =>
            {
                info!(pid, "attach failed, retrying once with elevated privileges");
                let envelope = self
                    .attempt(pid, worker_id, param, timeout, capacity, true)
                    .await?;
                // Only a successful elevated attach proves that sudo is
                // the fix; remember it for the rest of this process.
                self.sudo_required.store(true, Ordering::Relaxed);
                Ok(envelope)
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        pid: u32,
        worker_id: &str,
        param: &JsonValue,
        timeout: Duration,
        capacity: u64,
        elevate: bool,
    ) -> Result<ResultEnvelope, ExecutionError> {
        let pipeline = SharedPipeline::create(self.config.pipeline.spool_dir.as_deref(), capacity)?;

        let request = AgentRequest {
            target_pid: pid,
            worker_id: worker_id.to_string(),
            param: param.clone(),
            timeout_ms: timeout.as_millis() as u64,
            poll_interval_ms: self.config.execution.poll_interval.as_millis() as u64,
            pipeline_path: pipeline.path().to_path_buf(),
            pipeline_capacity: capacity,
        };
        debug!(pid, worker_id, capacity, elevate, "starting round trip");

        let spec = LaunchSpec {
            program: self.environment.agent_program().clone(),
            elevate,
            extra_env: self.config.agent.extra_env.clone(),
        };
        let mut handle = self.launcher.launch(&spec).await?;

        send_frame(&mut handle.stdin, &MessageEnvelope::new(request)).await?;

        // Reap before reading: the exit code is the only channel that is
        // guaranteed observable when attach fails.
        let deadline = timeout + self.config.execution.reap_grace_period;
        let code = match tokio::time::timeout(deadline, handle.process.wait()).await {
            Ok(Ok(code)) => code,
            Ok(Err(err)) => {
                return Err(ExecutionError::Protocol(format!(
                    "waiting for agent process failed: {}",
                    err
                )))
            }
            Err(_) => {
                let _ = handle.process.start_kill();
                return Err(ExecutionError::Protocol(format!(
                    "agent process did not exit within {:?}",
                    deadline
                )));
            }
        };

        // The exit code outranks stderr: an attach failure may leave sudo
        // or kernel diagnostics on stderr, and those must not mask the
        // retryable classification.
        match code {
            Some(SUCCESS_EXIT_CODE) => {}
            Some(ATTACH_FAILED_EXIT_CODE) => {
                return Err(ExecutionError::AttachFailed {
                    pid,
                    escalated: elevate,
                })
            }
            Some(other) => {
                return Err(ExecutionError::Protocol(format!(
                    "agent process exited with code {}",
                    other
                )))
            }
            None => {
                return Err(ExecutionError::Protocol(
                    "agent process terminated by signal".to_string(),
                ))
            }
        }

        let mut stderr_text = String::new();
        handle
            .stderr
            .read_to_string(&mut stderr_text)
            .await
            .map_err(|err| {
                ExecutionError::Protocol(format!("reading agent stderr failed: {}", err))
            })?;
        if let Some(line) = stderr_text
            .lines()
            .find(|line| !line.trim().is_empty() && !line.starts_with(BENIGN_STDERR_PREFIX))
        {
            return Err(ExecutionError::Protocol(format!(
                "agent stderr: {}",
                line.trim()
            )));
        }

        let response: MessageEnvelope<AgentResponse> = recv_frame(&mut handle.stdout).await?;
        let envelope = match response.message {
            AgentResponse::Inline { envelope } => envelope,
            AgentResponse::Pipeline { data_len } => {
                let bytes = pipeline.read(data_len)?;
                serde_json::from_slice(&bytes).map_err(|err| {
                    ExecutionError::Protocol(format!("undecodable pipeline payload: {}", err))
                })?
            }
            AgentResponse::Error { fault } => return Err(map_fault(fault)),
        };

        pipeline.release();
        Ok(envelope)
    }
}

/// Translate an agent-reported fault into the caller-facing taxonomy
fn map_fault(fault: AgentFault) -> ExecutionError {
    match fault {
        AgentFault::TargetNotReady { waited_ms } => ExecutionError::TargetNotReady { waited_ms },
        AgentFault::PipelineOverflow { required, capacity } => ExecutionError::PipelineOverflow {
            required,
            max: capacity,
        },
        AgentFault::WorkerFailed { worker_id, message } => {
            ExecutionError::Remote { worker_id, message }
        }
        AgentFault::UnknownWorker { id } => {
            ExecutionError::Protocol(format!("no worker registered as '{}'", id))
        }
        AgentFault::Internal { message } => {
            ExecutionError::Protocol(format!("agent internal error: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{AgentHandle, AgentProcess, LaunchSpec};
    use async_trait::async_trait;
    use periscope_ipc::inline_limit;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncWriteExt, DuplexStream};

    /// What one scripted helper process does after reading its request
    enum Script {
        Fail128,
        Fail128WithStderr(&'static str),
        Crash(i32),
        StderrNoise(&'static str),
        Respond {
            value: JsonValue,
            stdout: String,
            stderr: String,
            warn: Option<&'static str>,
        },
        Fault(AgentFault),
        Garbage,
    }

    struct ScriptedProcess {
        script: Script,
        stdin: DuplexStream,
        stdout: Option<DuplexStream>,
        stderr: Option<DuplexStream>,
        requests: Arc<Mutex<Vec<AgentRequest>>>,
    }

    #[async_trait]
    impl AgentProcess for ScriptedProcess {
        async fn wait(&mut self) -> io::Result<Option<i32>> {
            let envelope: MessageEnvelope<AgentRequest> = recv_frame(&mut self.stdin)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let request = envelope.message;
            self.requests.lock().unwrap().push(request.clone());

            let mut stdout = self.stdout.take().unwrap();
            let mut stderr = self.stderr.take().unwrap();

            let code = match &self.script {
                Script::Fail128 => ATTACH_FAILED_EXIT_CODE,
                Script::Fail128WithStderr(line) => {
                    stderr.write_all(line.as_bytes()).await.unwrap();
                    stderr.write_all(b"\n").await.unwrap();
                    ATTACH_FAILED_EXIT_CODE
                }
                Script::Crash(code) => *code,
                Script::StderrNoise(line) => {
                    stderr.write_all(line.as_bytes()).await.unwrap();
                    stderr.write_all(b"\n").await.unwrap();
                    SUCCESS_EXIT_CODE
                }
                Script::Garbage => {
                    stdout.write_all(b"not json\n").await.unwrap();
                    SUCCESS_EXIT_CODE
                }
                Script::Fault(fault) => {
                    let response = AgentResponse::Error {
                        fault: fault.clone(),
                    };
                    send_frame(&mut stdout, &MessageEnvelope::new(response))
                        .await
                        .unwrap();
                    SUCCESS_EXIT_CODE
                }
                Script::Respond {
                    value,
                    stdout: out,
                    stderr: err,
                    warn,
                } => {
                    if let Some(warning) = warn {
                        stderr.write_all(warning.as_bytes()).await.unwrap();
                        stderr.write_all(b"\n").await.unwrap();
                    }

                    let result = ResultEnvelope::new(value.clone(), out.clone(), err.clone());
                    let bytes = serde_json::to_vec(&result).unwrap();
                    let len = bytes.len() as u64;

                    let response = if len <= inline_limit(request.pipeline_capacity) {
                        AgentResponse::Inline { envelope: result }
                    } else if len <= request.pipeline_capacity {
                        let mut pipeline = SharedPipeline::open(
                            &request.pipeline_path,
                            request.pipeline_capacity,
                        )
                        .unwrap();
                        pipeline.write(&bytes).unwrap();
                        pipeline.release();
                        AgentResponse::Pipeline { data_len: len }
                    } else {
                        AgentResponse::Error {
                            fault: AgentFault::PipelineOverflow {
                                required: len,
                                capacity: request.pipeline_capacity,
                            },
                        }
                    };
                    send_frame(&mut stdout, &MessageEnvelope::new(response))
                        .await
                        .unwrap();
                    SUCCESS_EXIT_CODE
                }
            };

            // Closing the streams gives the controller its EOF.
            drop(stdout);
            drop(stderr);
            Ok(Some(code))
        }

        fn start_kill(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ScriptedLauncher {
        script: Mutex<VecDeque<Script>>,
        elevations: Arc<Mutex<Vec<bool>>>,
        requests: Arc<Mutex<Vec<AgentRequest>>>,
    }

    #[async_trait]
    impl AgentLauncher for ScriptedLauncher {
        async fn launch(&self, spec: &LaunchSpec) -> Result<AgentHandle, ExecutionError> {
            self.elevations.lock().unwrap().push(spec.elevate);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted launcher exhausted");

            let (ctrl_stdin, proc_stdin) = tokio::io::duplex(64 * 1024);
            let (proc_stdout, ctrl_stdout) = tokio::io::duplex(64 * 1024);
            let (proc_stderr, ctrl_stderr) = tokio::io::duplex(64 * 1024);

            Ok(AgentHandle {
                stdin: Box::new(ctrl_stdin),
                stdout: Box::new(ctrl_stdout),
                stderr: Box::new(ctrl_stderr),
                process: Box::new(ScriptedProcess {
                    script: step,
                    stdin: proc_stdin,
                    stdout: Some(proc_stdout),
                    stderr: Some(proc_stderr),
                    requests: Arc::clone(&self.requests),
                }),
            })
        }
    }

    struct Harness {
        executor: AgentExecutor<ScriptedLauncher>,
        elevations: Arc<Mutex<Vec<bool>>>,
        requests: Arc<Mutex<Vec<AgentRequest>>>,
    }

    fn harness(config: PeriscopeConfig, script: Vec<Script>) -> Harness {
        let elevations = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let launcher = ScriptedLauncher {
            script: Mutex::new(script.into()),
            elevations: Arc::clone(&elevations),
            requests: Arc::clone(&requests),
        };
        Harness {
            executor: AgentExecutor::with_launcher(config, launcher),
            elevations,
            requests,
        }
    }

    fn small_response() -> Script {
        Script::Respond {
            value: json!({"ok": true}),
            stdout: "hello from worker\n".to_string(),
            stderr: String::new(),
            warn: None,
        }
    }

    /// A value whose serialized envelope is roughly `kib` KiB
    fn big_value(kib: usize) -> JsonValue {
        json!("x".repeat(kib * 1024))
    }

    #[tokio::test]
    async fn test_inline_success_resolves_current_pid() {
        let h = harness(PeriscopeConfig::default(), vec![small_response()]);

        let outcome = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.value, json!({"ok": true}));
        assert_eq!(outcome.stdout, "hello from worker\n");

        let requests = h.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target_pid, std::process::id());
        assert_eq!(requests[0].worker_id, "diagnostics.echo");
    }

    #[tokio::test]
    async fn test_explicit_pid_is_forwarded() {
        let h = harness(PeriscopeConfig::default(), vec![small_response()]);

        let options = ExecuteOptions {
            target: TargetProcess::Pid(4242),
            ..ExecuteOptions::default()
        };
        h.executor
            .execute("diagnostics.echo", json!({}), options)
            .await
            .unwrap();

        assert_eq!(h.requests.lock().unwrap()[0].target_pid, 4242);
    }

    #[tokio::test]
    async fn test_medium_result_travels_through_pipeline() {
        // ~10 KiB: above the 8 KiB inline limit for a 16 KiB pipeline,
        // below the capacity itself.
        let value = big_value(10);
        let h = harness(
            PeriscopeConfig::default(),
            vec![Script::Respond {
                value: value.clone(),
                stdout: String::new(),
                stderr: String::new(),
                warn: None,
            }],
        );

        let outcome = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.value, value);
        assert_eq!(h.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overflow_doubles_capacity_until_result_fits() {
        let value = big_value(40);
        let respond = |v: &JsonValue| Script::Respond {
            value: v.clone(),
            stdout: String::new(),
            stderr: String::new(),
            warn: None,
        };
        let h = harness(
            PeriscopeConfig::default(),
            vec![respond(&value), respond(&value), respond(&value)],
        );

        let outcome = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.value, value);

        // 16 KiB and 32 KiB overflow, 64 KiB fits: two retries.
        let capacities: Vec<u64> = h
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.pipeline_capacity)
            .collect();
        assert_eq!(capacities, vec![16 * 1024, 32 * 1024, 64 * 1024]);
    }

    #[tokio::test]
    async fn test_overflow_beyond_cap_fails_with_configured_max() {
        let mut config = PeriscopeConfig::default();
        config.pipeline.max_capacity = 32 * 1024;

        let value = big_value(40);
        let respond = || Script::Respond {
            value: value.clone(),
            stdout: String::new(),
            stderr: String::new(),
            warn: None,
        };
        let h = harness(config, vec![respond(), respond()]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::PipelineOverflow { required, max } => {
                assert!(required > 40 * 1024);
                assert_eq!(max, 32 * 1024);
            }
            other => panic!("expected PipelineOverflow, got {:?}", other),
        }
        assert_eq!(h.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_expandable_pipeline_never_retries() {
        let mut config = PeriscopeConfig::default();
        config.pipeline.expandable = false;

        let h = harness(
            config,
            vec![Script::Respond {
                value: big_value(40),
                stdout: String::new(),
                stderr: String::new(),
                warn: None,
            }],
        );

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::PipelineOverflow { .. }));
        assert_eq!(h.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attach_failure_without_sudo_configured() {
        let h = harness(PeriscopeConfig::default(), vec![Script::Fail128]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::AttachFailed { escalated, .. } => assert!(!escalated),
            other => panic!("expected AttachFailed, got {:?}", other),
        }
        assert_eq!(*h.elevations.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_attach_failure_escalates_once_and_is_remembered() {
        let mut config = PeriscopeConfig::default();
        config.agent.try_with_sudo = true;

        let h = harness(
            config,
            vec![Script::Fail128, small_response(), small_response()],
        );

        h.executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        // The second call starts elevated without a failed plain attempt first.
        h.executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(*h.elevations.lock().unwrap(), vec![false, true, true]);
    }

    #[tokio::test]
    async fn test_attach_failure_with_stderr_diagnostics_still_escalates() {
        let mut config = PeriscopeConfig::default();
        config.agent.try_with_sudo = true;

        let h = harness(
            config,
            vec![
                Script::Fail128WithStderr("sudo: unable to resolve host periscope-ci"),
                small_response(),
            ],
        );

        h.executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(*h.elevations.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_escalated_attach_failure_is_final() {
        let mut config = PeriscopeConfig::default();
        config.agent.try_with_sudo = true;

        let h = harness(config, vec![Script::Fail128, Script::Fail128]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::AttachFailed { escalated, .. } => assert!(escalated),
            other => panic!("expected AttachFailed, got {:?}", other),
        }
        assert_eq!(*h.elevations.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_worker_failure_is_relayed_and_never_retried() {
        let h = harness(
            PeriscopeConfig::default(),
            vec![Script::Fault(AgentFault::WorkerFailed {
                worker_id: "diagnostics.echo".to_string(),
                message: "boom".to_string(),
            })],
        );

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::Remote { worker_id, message } => {
                assert_eq!(worker_id, "diagnostics.echo");
                assert_eq!(message, "boom");
            }
            other => panic!("expected Remote, got {:?}", other),
        }
        assert_eq!(h.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_target_not_ready_is_surfaced() {
        let h = harness(
            PeriscopeConfig::default(),
            vec![Script::Fault(AgentFault::TargetNotReady { waited_ms: 5000 })],
        );

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::TargetNotReady { waited_ms: 5000 }
        ));
    }

    #[tokio::test]
    async fn test_stderr_noise_is_a_protocol_error() {
        let h = harness(
            PeriscopeConfig::default(),
            vec![Script::StderrNoise("thread panicked at ...")],
        );

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::Protocol(message) => assert!(message.contains("panicked")),
            other => panic!("expected Protocol, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_warning_lines_on_stderr_are_benign() {
        let h = harness(
            PeriscopeConfig::default(),
            vec![Script::Respond {
                value: json!(1),
                stdout: String::new(),
                stderr: String::new(),
                warn: Some("WARNING: symbol table incomplete"),
            }],
        );

        let outcome = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.value, json!(1));
    }

    #[tokio::test]
    async fn test_unexpected_exit_code_is_a_protocol_error() {
        let h = harness(PeriscopeConfig::default(), vec![Script::Crash(3)]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_garbage_response_is_a_protocol_error() {
        let h = harness(PeriscopeConfig::default(), vec![Script::Garbage]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_disabled_environment_never_launches() {
        let mut config = PeriscopeConfig::default();
        config.agent.enabled = false;

        let h = harness(config, vec![]);

        let err = h
            .executor
            .execute("diagnostics.echo", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotEnabled(_)));
        assert!(h.elevations.lock().unwrap().is_empty());
    }
}
