//! Client-facing errors.

use airdispatch_core::error::{EnvelopeError, RouterError};
use airdispatch_proto::wire::WireError;
use thiserror::Error;

/// Everything that can go wrong sending, pulling, or listing mail.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failure while building, signing, or opening an envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Failure while resolving a recipient or tracker through the router.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Underlying connection I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The peer answered with an `ERR` record instead of the expected type.
    #[error("server returned error {code}: {description}")]
    ReceivedError {
        /// Numeric error code from the `ERR` record.
        code: u32,
        /// Human-readable description from the `ERR` record.
        description: String,
    },

    /// The peer answered with a type other than `ERR` or the one requested.
    #[error("unexpected response type {0:?}")]
    UnexpectedResponseType(String),

    /// A streamed `Data` payload's declared length did not match the bytes
    /// actually streamed, or `sha256(decrypted) != hash`.
    #[error("streamed payload failed integrity verification: {0}")]
    IntegrityMismatch(String),
}

impl ClientError {
    /// Builds a [`ClientError::ReceivedError`] from a decoded `ERR` record.
    #[must_use]
    pub fn from_wire(error: WireError) -> Self {
        Self::ReceivedError { code: error.code, description: error.description }
    }
}
