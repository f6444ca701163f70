//! Error types produced while framing or encoding wire messages.

use thiserror::Error;

/// Errors raised by the frame codec and the CBOR wire schemas.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The six-byte record prefix did not start with the `"AD"` magic.
    #[error("framing: expected magic b\"AD\", got {0:02x?}")]
    BadMagic([u8; 2]),

    /// The record declared a zero-length payload.
    #[error("framing: record declared a zero-length payload")]
    ZeroLengthPayload,

    /// Fewer bytes were available than the declared record length.
    #[error("framing: short read, expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes the header promised.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// A record exceeded the maximum payload size this implementation accepts.
    #[error("framing: payload length {0} exceeds the maximum record size")]
    PayloadTooLarge(u32),

    /// CBOR decoding failed for a wire message.
    #[error("unmarshalling: {0}")]
    Unmarshalling(String),

    /// CBOR encoding failed for a wire message (should not happen for
    /// well-formed in-memory values; surfaced rather than panicking).
    #[error("marshalling: {0}")]
    Marshalling(String),

    /// A three-letter type tag did not match any known message kind.
    #[error("incorrect parameter: unknown message type tag {0:?}")]
    UnknownTypeTag(String),
}

/// Convenience alias for proto-layer results.
pub type Result<T> = std::result::Result<T, ProtoError>;
