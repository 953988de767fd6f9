//! Fd-level console capture around the worker call
//!
//! The worker runs inside a detached helper process, so anything it
//! prints would otherwise be lost (or, worse, corrupt the response
//! stream on fd 1). For the duration of the call fds 1 and 2 are
//! redirected into pipes drained by background threads; the captured
//! text travels back to the controller in the result envelope.

use std::io;

#[cfg(unix)]
pub use unix::ConsoleCapture;

#[cfg(unix)]
mod unix {
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::thread::JoinHandle;

    use super::CapturedOutput;

    fn dup_fd(fd: RawFd) -> io::Result<OwnedFd> {
        let duplicate = unsafe { libc::dup(fd) };
        if duplicate < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(duplicate) })
    }

    fn redirect(src: RawFd, dst: RawFd) -> io::Result<()> {
        if unsafe { libc::dup2(src, dst) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn drain(mut reader: os_pipe::PipeReader) -> JoinHandle<Vec<u8>> {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    }

    /// Active redirection of fds 1 and 2 into in-memory buffers.
    ///
    /// Drain threads run while the worker executes so a chatty worker
    /// never blocks on a full pipe buffer.
    pub struct ConsoleCapture {
        saved_stdout: OwnedFd,
        saved_stderr: OwnedFd,
        stdout_writer: os_pipe::PipeWriter,
        stderr_writer: os_pipe::PipeWriter,
        stdout_drain: JoinHandle<Vec<u8>>,
        stderr_drain: JoinHandle<Vec<u8>>,
    }

    impl ConsoleCapture {
        pub fn install() -> io::Result<Self> {
            // Flush anything buffered at the Rust level before the fds move.
            let _ = io::stdout().flush();
            let _ = io::stderr().flush();

            let saved_stdout = dup_fd(libc::STDOUT_FILENO)?;
            let saved_stderr = dup_fd(libc::STDERR_FILENO)?;

            let (stdout_reader, stdout_writer) = os_pipe::pipe()?;
            let (stderr_reader, stderr_writer) = os_pipe::pipe()?;

            redirect(stdout_writer.as_raw_fd(), libc::STDOUT_FILENO)?;
            if let Err(err) = redirect(stderr_writer.as_raw_fd(), libc::STDERR_FILENO) {
                // Put stdout back before bailing out.
                let _ = redirect(saved_stdout.as_raw_fd(), libc::STDOUT_FILENO);
                return Err(err);
            }

            Ok(Self {
                saved_stdout,
                saved_stderr,
                stdout_writer,
                stderr_writer,
                stdout_drain: drain(stdout_reader),
                stderr_drain: drain(stderr_reader),
            })
        }

        /// Restore the original fds and collect everything captured
        pub fn finish(self) -> io::Result<CapturedOutput> {
            let _ = io::stdout().flush();
            let _ = io::stderr().flush();

            redirect(self.saved_stdout.as_raw_fd(), libc::STDOUT_FILENO)?;
            redirect(self.saved_stderr.as_raw_fd(), libc::STDERR_FILENO)?;

            // Dropping the last write ends gives the drain threads EOF.
            drop(self.stdout_writer);
            drop(self.stderr_writer);

            let stdout = self
                .stdout_drain
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "stdout drain panicked"))?;
            let stderr = self
                .stderr_drain
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "stderr drain panicked"))?;

            Ok(CapturedOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
    }
}

/// Serializes tests that redirect the process-global fds
#[cfg(all(test, unix))]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    match LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Text a worker printed while it ran
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[cfg(not(unix))]
pub struct ConsoleCapture;

#[cfg(not(unix))]
impl ConsoleCapture {
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    pub fn finish(self) -> io::Result<CapturedOutput> {
        Ok(CapturedOutput::default())
    }
}
