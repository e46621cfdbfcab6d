//! Resilience patterns for Skein
//!
//! This crate provides the backoff strategies used to pace reconnection
//! attempts of the durable request socket.

pub mod backoff;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffPolicy, BackoffStrategy};
