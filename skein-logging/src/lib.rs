//! Logging setup for Skein
//!
//! Library crates emit records through the `log` facade. This crate installs
//! a `tracing-subscriber` formatter that also collects those records, with
//! the level, format and filter taken from [`skein_config::LoggingConfig`].

pub mod init;

pub use init::{build_filter, init_logging_from_config, init_simple_tracing};
