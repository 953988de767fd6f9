//! Periscope execution engine (controller side)
//!
//! This crate drives one round trip of the out-of-process protocol: it
//! discovers the environment once at startup, spawns the short-lived
//! agent process, ships the request over its stdin, interprets exit
//! code / stderr / response frame, pulls large results out of the shared
//! pipeline, and applies the retry policy (capacity doubling on overflow,
//! one cached privilege escalation on attach failure).

pub mod environment;
pub mod error;
pub mod launcher;
pub mod orchestrator;

// Re-export main types
pub use environment::Environment;
pub use error::ExecutionError;
pub use launcher::{AgentHandle, AgentLauncher, LaunchSpec, ProcessLauncher};
pub use orchestrator::{AgentExecutor, ExecuteOptions, ExecutionOutcome, TargetProcess};
