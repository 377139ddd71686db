//! Connection-level stream lifecycle events.

use crate::types::{StreamId, StreamState};

/// Receives stream lifecycle notifications from a connection.
///
/// A codec registers implementors with its connection and delivers events on
/// the connection's executor, in the order the transitions happened. All
/// methods are synchronous and must run to completion before the next event
/// is delivered; implementors must not block.
pub trait StreamEventListener {
    /// A stream was inserted into the connection's stream map.
    ///
    /// `state` is the stream's state at insertion time, which may already be
    /// a reserved state for push-promised streams.
    fn on_stream_added(&mut self, id: StreamId, state: StreamState);

    /// A stream left IDLE for an open or half-closed state.
    fn on_stream_active(&mut self, id: StreamId);

    /// A stream transitioned to CLOSED but is still in the stream map.
    fn on_stream_closed(&mut self, id: StreamId);

    /// A stream was evicted from the connection's stream map.
    fn on_stream_removed(&mut self, id: StreamId);
}
