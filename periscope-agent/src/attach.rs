//! Debugger attachment to the target process
//!
//! The attach attempt runs on a dedicated thread because the underlying
//! ptrace calls can hang; the coordinator only ever observes the
//! [`AttachSlot`], never the thread itself. Memory reads go through
//! `process_vm_readv`, which has no tracer-thread affinity, so the
//! session can be used from the coordinator task after the attach
//! thread has finished.

use std::io;
use std::sync::Mutex;

use thiserror::Error;

/// Attach failures, reported through the reserved exit code
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("attaching to pid {pid} failed: {message}")]
    Failed { pid: u32, message: String },

    #[error("debugger attach is not supported on this platform")]
    Unsupported,
}

/// Live debugger session against a stopped target
pub trait TargetSession: Send {
    /// Pid of the attached target
    fn pid(&self) -> u32;

    /// Read `len` bytes of the target's memory at `addr`
    fn read_memory(&self, addr: usize, len: usize) -> io::Result<Vec<u8>>;

    /// Best-effort detach; the kernel detaches anyway when the helper
    /// exits, so failures here are swallowed
    fn detach(&mut self);
}

/// Source of attach sessions; a trait so the coordinator can be driven
/// without ptrace privileges in tests
pub trait Attacher: Send + Sync + 'static {
    fn attach(&self, pid: u32) -> Result<Box<dyn TargetSession>, AttachError>;
}

/// Single-use mailbox between the attach thread and the coordinator
///
/// The attach thread fulfills it exactly once; the coordinator's polling
/// loop takes the outcome when it appears.
pub struct AttachSlot {
    inner: Mutex<Option<Result<Box<dyn TargetSession>, AttachError>>>,
}

impl AttachSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn fulfill(&self, outcome: Result<Box<dyn TargetSession>, AttachError>) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(outcome);
        }
    }

    /// Take the outcome if the attach thread has delivered one
    pub fn take(&self) -> Option<Result<Box<dyn TargetSession>, AttachError>> {
        match self.inner.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }
}

impl Default for AttachSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
pub use linux::PtraceAttacher;

#[cfg(target_os = "linux")]
mod linux {
    use std::io;
    use std::io::IoSliceMut;

    use nix::sys::ptrace;
    use nix::sys::uio::{process_vm_readv, RemoteIoVec};
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;
    use tracing::debug;

    use super::{AttachError, Attacher, TargetSession};

    /// Real attacher: `PTRACE_SEIZE` + `PTRACE_INTERRUPT`, then wait for
    /// the tracing-stop of the target's main thread.
    pub struct PtraceAttacher;

    impl Attacher for PtraceAttacher {
        fn attach(&self, pid: u32) -> Result<Box<dyn TargetSession>, AttachError> {
            let target = Pid::from_raw(pid as i32);

            ptrace::seize(target, ptrace::Options::empty()).map_err(|err| {
                AttachError::Failed {
                    pid,
                    message: format!("PTRACE_SEIZE: {}", err),
                }
            })?;
            ptrace::interrupt(target).map_err(|err| AttachError::Failed {
                pid,
                message: format!("PTRACE_INTERRUPT: {}", err),
            })?;

            // Readiness is the observed tracing-stop of the main thread.
            // This can block, which is why attach runs on its own thread;
            // a target that never stops shows up as a readiness timeout,
            // not an attach failure.
            match waitpid(target, Some(WaitPidFlag::WSTOPPED)) {
                Ok(WaitStatus::Stopped(..)) | Ok(WaitStatus::PtraceEvent(..)) => {}
                Ok(status) => {
                    return Err(AttachError::Failed {
                        pid,
                        message: format!("unexpected wait status {:?}", status),
                    })
                }
                Err(err) => {
                    return Err(AttachError::Failed {
                        pid,
                        message: format!("waitpid: {}", err),
                    })
                }
            }

            debug!(pid, "target stopped under trace");
            Ok(Box::new(PtraceSession { pid, detached: false }))
        }
    }

    struct PtraceSession {
        pid: u32,
        detached: bool,
    }

    impl TargetSession for PtraceSession {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn read_memory(&self, addr: usize, len: usize) -> io::Result<Vec<u8>> {
            let mut buffer = vec![0u8; len];
            let remote = RemoteIoVec { base: addr, len };
            let read = process_vm_readv(
                Pid::from_raw(self.pid as i32),
                &mut [IoSliceMut::new(&mut buffer)],
                &[remote],
            )
            .map_err(|err| io::Error::from_raw_os_error(err as i32))?;
            buffer.truncate(read);
            Ok(buffer)
        }

        fn detach(&mut self) {
            if self.detached {
                return;
            }
            self.detached = true;
            let _ = ptrace::detach(Pid::from_raw(self.pid as i32), None);
        }
    }

    impl Drop for PtraceSession {
        fn drop(&mut self) {
            self.detach();
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use fallback::UnsupportedAttacher;

#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::{AttachError, Attacher, TargetSession};

    /// Placeholder for platforms without a ptrace-style attach; the
    /// controller never launches a helper there, this exists so the
    /// binary still links.
    pub struct UnsupportedAttacher;

    impl Attacher for UnsupportedAttacher {
        fn attach(&self, _pid: u32) -> Result<Box<dyn TargetSession>, AttachError> {
            Err(AttachError::Unsupported)
        }
    }
}
