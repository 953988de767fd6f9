//! Domain-driven configuration management for Periscope
//!
//! This crate provides modular configuration split by functional domains,
//! with validation, defaults, and environment variable support. All values
//! are resolved once at process start and treated as immutable afterwards.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    agent::AgentConfig, execution::ExecutionConfig, pipeline::PipelineConfig, PeriscopeConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration_ms;
