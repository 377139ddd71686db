//! Braid Core - Strongly-typed HTTP/2 identifiers and shared protocol types.
//!
//! This crate provides the vocabulary shared between the Braid scheduler and
//! the surrounding HTTP/2 codec: stream identifiers, priority weights, the
//! RFC 7540 stream-state and error-code enums, and the listener trait through
//! which a connection reports stream lifecycle events. It deliberately knows
//! nothing about frames, flow control, or scheduling.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up a stream id with a byte count
//! - **Explicit limits**: Identifiers and weights validate their protocol range
//! - **Explicit types**: Use u32/u64, not usize
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod listener;
mod types;

pub use listener::StreamEventListener;
pub use types::{ErrorCode, StreamId, StreamState, Weight, MAX_STREAM_ID};
