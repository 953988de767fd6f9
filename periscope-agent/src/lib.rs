//! Periscope agent (helper side)
//!
//! A helper process is spawned by the controller for exactly one round
//! trip: read a request from stdin, attach to the target as a debugger,
//! run the requested worker, write the response to stdout, exit. Exit
//! code 128 is reserved for attach failure; every later fault travels
//! on the response stream.
//!
//! An application embedding the controller becomes its own helper by
//! checking [`is_agent_invocation`] first thing in `main` and routing
//! into [`agent_main`] instead of its normal startup.

use std::sync::Arc;

use periscope_ipc::AGENT_MODE_ENV;

pub mod attach;
pub mod builtin;
pub mod capture;
pub mod coordinator;
pub mod registry;
pub mod worker;

pub use attach::{AttachError, Attacher, TargetSession};
#[cfg(target_os = "linux")]
pub use attach::PtraceAttacher;
pub use capture::CapturedOutput;
pub use coordinator::AttachCoordinator;
pub use registry::WorkerRegistry;
pub use worker::{Worker, WorkerContext, WorkerError};

/// Whether this process was started as a Periscope helper
pub fn is_agent_invocation() -> bool {
    std::env::var_os(AGENT_MODE_ENV).is_some_and(|value| value == "1")
}

/// Run the helper protocol over this process's standard streams and
/// return the exit code for `std::process::exit`.
///
/// No log subscriber is installed here on purpose: stderr is a protocol
/// channel, and anything written to it that does not start with
/// `WARNING` fails the whole call on the controller side.
pub fn agent_main(registry: WorkerRegistry) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(_) => return 1,
    };

    #[cfg(target_os = "linux")]
    let attacher: Arc<dyn Attacher> = Arc::new(PtraceAttacher);
    #[cfg(not(target_os = "linux"))]
    let attacher: Arc<dyn Attacher> = Arc::new(attach::UnsupportedAttacher);

    let coordinator = AttachCoordinator::new(attacher, registry);
    runtime.block_on(async {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        coordinator.run(&mut stdin, &mut stdout).await
    })
}
