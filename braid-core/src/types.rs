//! Strongly-typed HTTP/2 protocol values.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up raw
//! integers, and every protocol range is validated where the value is made.

use std::fmt;

/// Maximum valid HTTP/2 stream identifier (31-bit unsigned space, RFC 7540 §5.1.1).
pub const MAX_STREAM_ID: u32 = (1 << 31) - 1;

/// Identifier of a stream within a single HTTP/2 connection.
///
/// Stream `0` is the connection itself and roots the priority tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct StreamId(u32);

impl StreamId {
    /// The connection stream, id `0`.
    pub const CONNECTION: Self = Self(0);

    /// The largest identifier the wire format can carry.
    pub const MAX: Self = Self(MAX_STREAM_ID);

    /// Creates a stream id from a raw u32 value.
    ///
    /// # Panics
    /// Panics if the value does not fit the 31-bit identifier space.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        assert!(value <= MAX_STREAM_ID, "stream id out of 31-bit range");
        Self(value)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this id names the connection stream.
    #[inline]
    #[must_use]
    pub const fn is_connection(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<StreamId> for u32 {
    fn from(id: StreamId) -> Self {
        id.get()
    }
}

/// Priority weight of a stream, `1..=256` (RFC 7540 §5.3.2).
///
/// PRIORITY frames carry `weight - 1` in a single byte; use
/// [`from_wire`](Self::from_wire) / [`to_wire`](Self::to_wire) at the codec
/// boundary.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Weight(u16);

impl Weight {
    /// Smallest allowed weight.
    pub const MIN: Self = Self(1);

    /// Largest allowed weight.
    pub const MAX: Self = Self(256);

    /// Weight assigned to streams that never received a PRIORITY frame.
    pub const DEFAULT: Self = Self(16);

    /// Creates a weight from a raw u16 value.
    ///
    /// # Panics
    /// Panics if the value is outside `1..=256`.
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Self {
        assert!(matches!(value, 1..=256), "weight out of range");
        Self(value)
    }

    /// Returns the raw u16 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Decodes the one-byte wire form (`weight - 1`).
    #[inline]
    #[must_use]
    pub const fn from_wire(value: u8) -> Self {
        Self(value as u16 + 1)
    }

    /// Encodes the one-byte wire form (`weight - 1`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Range 1..=256 maps to 0..=255.
    pub const fn to_wire(self) -> u8 {
        (self.0 - 1) as u8
    }
}

impl Default for Weight {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "weight({})", self.0)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "weight-{}", self.0)
    }
}

/// Stream states of the RFC 7540 §5.1 state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Neither side has used the stream yet.
    Idle,
    /// Reserved by a local PUSH_PROMISE.
    ReservedLocal,
    /// Reserved by a remote PUSH_PROMISE.
    ReservedRemote,
    /// Both sides may send frames.
    Open,
    /// The local side has finished sending.
    HalfClosedLocal,
    /// The remote side has finished sending.
    HalfClosedRemote,
    /// The stream is finished.
    Closed,
}

impl StreamState {
    /// Whether the stream sits in one of the reserved states.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::ReservedLocal | Self::ReservedRemote)
    }

    /// Whether the stream is finished.
    #[inline]
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// HTTP/2 error codes (RFC 7540 §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown or no error condition.
    NoError = 0x0,
    /// The peer violated the protocol.
    ProtocolError = 0x1,
    /// An unexpected internal failure.
    InternalError = 0x2,
    /// A flow-control limit was violated.
    FlowControlError = 0x3,
    /// A SETTINGS frame was not acknowledged in time.
    SettingsTimeout = 0x4,
    /// A frame arrived for a half-closed stream.
    StreamClosed = 0x5,
    /// A frame had an invalid size.
    FrameSizeError = 0x6,
    /// The stream was refused before any application processing.
    RefusedStream = 0x7,
    /// The stream is no longer needed.
    Cancel = 0x8,
    /// Header compression state cannot be maintained.
    CompressionError = 0x9,
    /// A CONNECT tunnel was reset or closed abnormally.
    ConnectError = 0xa,
    /// The peer is generating excessive load.
    EnhanceYourCalm = 0xb,
    /// Transport security properties are inadequate.
    InadequateSecurity = 0xc,
    /// HTTP/1.1 is required for the request.
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Returns the wire value of the code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "NO_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::SettingsTimeout => "SETTINGS_TIMEOUT",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::FrameSizeError => "FRAME_SIZE_ERROR",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::Cancel => "CANCEL",
            Self::CompressionError => "COMPRESSION_ERROR",
            Self::ConnectError => "CONNECT_ERROR",
            Self::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Self::InadequateSecurity => "INADEQUATE_SECURITY",
            Self::Http11Required => "HTTP_1_1_REQUIRED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_display() {
        let id = StreamId::new(42);
        assert_eq!(format!("{id}"), "stream-42");
        assert_eq!(format!("{id:?}"), "stream(42)");
    }

    #[test]
    fn test_stream_id_ordering() {
        let a = StreamId::new(3);
        let b = StreamId::new(5);
        let c = StreamId::new(3);

        assert!(a < b);
        assert!(b > a);
        assert_eq!(a, c);
    }

    #[test]
    fn test_connection_stream_id() {
        assert!(StreamId::CONNECTION.is_connection());
        assert!(!StreamId::new(1).is_connection());
        assert_eq!(StreamId::default(), StreamId::CONNECTION);
    }

    #[test]
    #[should_panic(expected = "stream id out of 31-bit range")]
    fn test_stream_id_overflow_panics() {
        let _ = StreamId::new(MAX_STREAM_ID + 1);
    }

    #[test]
    fn test_weight_bounds() {
        assert_eq!(Weight::MIN.get(), 1);
        assert_eq!(Weight::MAX.get(), 256);
        assert_eq!(Weight::default(), Weight::DEFAULT);
        assert_eq!(Weight::DEFAULT.get(), 16);
    }

    #[test]
    fn test_weight_wire_form() {
        assert_eq!(Weight::from_wire(0), Weight::MIN);
        assert_eq!(Weight::from_wire(255), Weight::MAX);
        assert_eq!(Weight::new(16).to_wire(), 15);
        for wire in [0_u8, 1, 15, 127, 255] {
            assert_eq!(Weight::from_wire(wire).to_wire(), wire);
        }
    }

    #[test]
    #[should_panic(expected = "weight out of range")]
    fn test_weight_zero_panics() {
        let _ = Weight::new(0);
    }

    #[test]
    #[should_panic(expected = "weight out of range")]
    fn test_weight_overflow_panics() {
        let _ = Weight::new(257);
    }

    #[test]
    fn test_stream_state_predicates() {
        assert!(StreamState::ReservedLocal.is_reserved());
        assert!(StreamState::ReservedRemote.is_reserved());
        assert!(!StreamState::Open.is_reserved());
        assert!(StreamState::Closed.is_closed());
        assert!(!StreamState::HalfClosedLocal.is_closed());
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::NoError.code(), 0x0);
        assert_eq!(ErrorCode::InternalError.code(), 0x2);
        assert_eq!(ErrorCode::Http11Required.code(), 0xd);
        assert_eq!(format!("{}", ErrorCode::InternalError), "INTERNAL_ERROR");
    }
}
