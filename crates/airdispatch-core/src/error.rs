//! Per-layer error types, connected by `From` impls up to the dispatcher
//! boundary.

use thiserror::Error;

use airdispatch_crypto::CryptoError;
use airdispatch_proto::ProtoError;

/// Errors raised while building, verifying, or reconstructing an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Wire framing or CBOR decode failure.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Key parsing, signing, or hybrid-(en|de)cryption failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A signature failed to verify, or `header.from` did not match any
    /// verified signer's derived address.
    #[error("invalid signature")]
    InvalidSignature,

    /// `reconstruct` was asked to enforce the timestamp window and
    /// `|now - header.timestamp| > 600s`.
    #[error("timestamp outside the ±600s window")]
    TimestampOutOfWindow,

    /// The receiver's fingerprint is not present in the encrypted message's
    /// per-recipient header table.
    #[error("not authorized: message is not addressed to this identity")]
    NotAuthorized,

    /// A type tag did not match what the caller expected.
    #[error("unexpected message type: expected {expected}, got {got}")]
    UnexpectedMessageType {
        /// Type tag the caller expected.
        expected: &'static str,
        /// Type tag actually present.
        got: String,
    },

    /// A caller-supplied parameter was out of bounds (e.g. an empty
    /// recipient list).
    #[error("incorrect parameter: {0}")]
    IncorrectParameter(String),
}

/// Errors raised while resolving an address through a [`crate::router::Router`].
#[derive(Debug, Error)]
pub enum RouterError {
    /// Underlying envelope failure while talking to a tracker.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// I/O failure while connecting to or reading from a tracker.
    #[error("network error: {0}")]
    Network(String),

    /// A tracker's DNS-pinned fingerprint did not match its response signer.
    #[error("tracker verification failed: pinned fingerprint did not match the response signer")]
    TrackerVerificationError,

    /// Every tracker in a `TrackerList` returned an error.
    #[error("no tracker could resolve the requested address")]
    TrackerListQueryError,

    /// No tracker resolved the query within the fan-out deadline.
    #[error("tracker fan-out timed out")]
    Timeout,

    /// Storage miss: the address is not registered anywhere queried.
    #[error("address not found")]
    AddressNotFound,
}

/// Convenience alias for envelope-layer results.
pub type EnvelopeResult<T> = std::result::Result<T, EnvelopeError>;

/// Convenience alias for router-layer results.
pub type RouterResult<T> = std::result::Result<T, RouterError>;
