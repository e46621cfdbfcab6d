//! Inter-process communication for Skein
//!
//! This crate provides length-prefixed framing over byte streams, a shared
//! key challenge/response handshake, and the two halves of a strict
//! request/reply protocol over TCP:
//!
//! - [`ReplySocket`] accepts any number of authenticated connections and
//!   hands their requests to the application one at a time.
//! - [`RequestSocket`] keeps a single connection alive, reconnecting after
//!   transient failures, with at most one request in flight.

pub mod auth;
pub mod codec;
pub mod error;
pub mod frame;
pub mod rep;
pub mod req;

// Re-export commonly used types
pub use auth::{answer_challenge, send_challenge, DIGEST_LENGTH, NONCE_LENGTH};
pub use codec::{decode_value, encode_value};
pub use error::IpcError;
pub use frame::{read_frame, write_frame, MessageStream, LENGTH_PREFIX};
pub use rep::ReplySocket;
pub use req::{ReconnectPolicy, RequestSocket};
