//! Domain-driven configuration management for Skein
//!
//! This crate provides configuration split by functional domains (task
//! runtime, sockets, logging) with validation, defaults, and environment
//! variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    runtime::RuntimeConfig,
    socket::SocketConfig,
    SkeinConfig,
};
