//! Spawning of the short-lived agent process
//!
//! The launcher is a trait seam: production code goes through
//! [`ProcessLauncher`] and a real child process, while orchestrator tests
//! substitute a scripted launcher speaking the same protocol over
//! in-memory streams.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use periscope_ipc::AGENT_MODE_ENV;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::ExecutionError;

/// Everything needed to start one helper process
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Agent executable, normally the controller binary itself
    pub program: PathBuf,
    /// Run under `sudo` for this attempt
    pub elevate: bool,
    /// Extra environment forwarded verbatim
    pub extra_env: HashMap<String, String>,
}

/// Resolve the launch spec into the program and arguments actually spawned
pub fn command_line(spec: &LaunchSpec) -> (OsString, Vec<OsString>) {
    if spec.elevate {
        ("sudo".into(), vec![spec.program.clone().into()])
    } else {
        (spec.program.clone().into(), Vec::new())
    }
}

/// Running helper process with its three standard streams
pub struct AgentHandle {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub process: Box<dyn AgentProcess>,
}

/// Lifecycle handle of the spawned process
#[async_trait]
pub trait AgentProcess: Send {
    /// Wait for exit; `None` means killed by a signal
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Request termination without waiting
    fn start_kill(&mut self) -> io::Result<()>;
}

#[async_trait]
impl AgentProcess for Child {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = Child::wait(self).await?;
        Ok(status.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Child::start_kill(self)
    }
}

/// Source of agent processes
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<AgentHandle, ExecutionError>;
}

/// Launcher backed by a real child process
#[derive(Debug, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<AgentHandle, ExecutionError> {
        let (program, args) = command_line(spec);
        debug!(program = ?program, elevate = spec.elevate, "launching agent process");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .env(AGENT_MODE_ENV, "1")
            .envs(&spec.extra_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            ExecutionError::Protocol(format!(
                "failed to spawn agent process {:?}: {}",
                program, err
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::Protocol("agent stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Protocol("agent stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Protocol("agent stderr not captured".to_string()))?;

        Ok(AgentHandle {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            process: Box::new(child),
        })
    }
}
