//! Dispatcher-level errors and their wire representation.

use airdispatch_core::envelope::{Container, EncryptedMessage, Header, SignedMessage};
use airdispatch_core::identity::{Address, Identity};
use airdispatch_core::error::{EnvelopeError, EnvelopeResult, RouterError};
use airdispatch_proto::ProtoError;
use airdispatch_crypto::CryptoError;
use airdispatch_proto::wire::{type_tag, WireError};
use thiserror::Error;

use crate::storage::StorageError;

/// The numeric codes an `ERR` record carries on the wire.
///
/// Matches the error-kind vocabulary one-for-one so a peer can tell exactly
/// which of the documented failures occurred without parsing `description`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Magic or length invalid; connection-fatal (never actually placed on
    /// the wire, since framing failures close the connection instead).
    Framing = 1,
    /// CBOR decode failure at any layer.
    Unmarshalling = 2,
    /// A signature failed to verify, or `header.from` matched no signer.
    InvalidSignature = 3,
    /// `|now - header.timestamp| > 600s` under enforced reconstruction.
    TimestampOutOfWindow = 4,
    /// Requester is not in the approved set of a stored message, or cannot
    /// decrypt a message not addressed to them.
    NotAuthorized = 5,
    /// No stored message matches the requested `(author, name)`.
    MessageNotFound = 6,
    /// The router could not resolve the requested address.
    AddressNotFound = 7,
    /// A tracker's pinned fingerprint did not match its response signer.
    TrackerVerificationError = 8,
    /// Every tracker in a fan-out returned an error.
    TrackerListQueryError = 9,
    /// The 30-second tracker fan-out deadline elapsed.
    Timeout = 10,
    /// RSA-OAEP or AES-CFB (en|de)cryption failed.
    Decryption = 11,
    /// A type tag did not match what the caller expected.
    UnexpectedMessageType = 12,
    /// A caller-supplied parameter was out of bounds.
    IncorrectParameter = 13,
    /// Any other failure; indicates a bug or a backend outage.
    Internal = 14,
}

/// Everything that can go wrong while dispatching one connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Failure while decoding, verifying, or reconstructing the envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Failure while resolving a recipient through the router.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Underlying connection I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No stored message matches the requested `(author, name)`.
    #[error("no message found for that name")]
    MessageNotFound,

    /// The requester's fingerprint is not in the approved set.
    #[error("not authorized: requester is not an approved recipient")]
    NotAuthorized,

    /// The incoming record's type tag has no dispatch handler.
    #[error("unexpected message type: {0:?}")]
    UnexpectedMessageType(String),

    /// A streamed `Data` payload's declared length did not match the bytes
    /// actually streamed, or `sha256(decrypted) != hash`.
    #[error("streamed payload failed integrity verification: {0}")]
    IntegrityMismatch(String),

    /// Any other failure; indicates a bug or a backend outage.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Maps this error onto the wire's numeric error vocabulary.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Envelope(err) => envelope_code(err),
            Self::Router(err) => router_code(err),
            Self::Storage(_) | Self::Io(_) => ErrorCode::Internal,
            Self::MessageNotFound => ErrorCode::MessageNotFound,
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::UnexpectedMessageType(_) => ErrorCode::UnexpectedMessageType,
            Self::IntegrityMismatch(_) => ErrorCode::Decryption,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Builds a signed `ERR` record addressed to `requester`, ready to be
    /// written as the connection's response.
    ///
    /// Used only once `header.from` is known, i.e. after the inbound
    /// envelope has already been reconstructed; framing and reconstruction
    /// failures close the connection instead of producing a record.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] if signing or re-wrapping the error
    /// record itself fails.
    pub fn to_encrypted_record(
        &self,
        server_identity: &Identity,
        requester: &Address,
    ) -> EnvelopeResult<Vec<u8>> {
        let wire = WireError { code: self.code() as u32, description: self.to_string() };
        let payload = wire.encode()?;

        let header = Header::new(server_identity.address(), requester.clone());
        let container = Container::new(header, payload, type_tag::ERROR);
        let signed = SignedMessage::sign(&container, server_identity)?;

        let encrypted = if requester.is_public() {
            EncryptedMessage::unencrypted(&signed)?
        } else {
            let mut encrypted = EncryptedMessage::encrypt(&signed)?;
            encrypted.add_recipient(requester)?;
            encrypted
        };

        encrypted.encode()
    }
}

fn envelope_code(err: &EnvelopeError) -> ErrorCode {
    match err {
        EnvelopeError::Proto(proto) => proto_code(proto),
        EnvelopeError::Crypto(crypto) => crypto_code(crypto),
        EnvelopeError::InvalidSignature => ErrorCode::InvalidSignature,
        EnvelopeError::TimestampOutOfWindow => ErrorCode::TimestampOutOfWindow,
        EnvelopeError::NotAuthorized => ErrorCode::NotAuthorized,
        EnvelopeError::UnexpectedMessageType { .. } => ErrorCode::UnexpectedMessageType,
        EnvelopeError::IncorrectParameter(_) => ErrorCode::IncorrectParameter,
    }
}

fn router_code(err: &RouterError) -> ErrorCode {
    match err {
        RouterError::Envelope(envelope) => envelope_code(envelope),
        RouterError::Network(_) => ErrorCode::Internal,
        RouterError::TrackerVerificationError => ErrorCode::TrackerVerificationError,
        RouterError::TrackerListQueryError => ErrorCode::TrackerListQueryError,
        RouterError::Timeout => ErrorCode::Timeout,
        RouterError::AddressNotFound => ErrorCode::AddressNotFound,
    }
}

fn proto_code(err: &ProtoError) -> ErrorCode {
    match err {
        ProtoError::BadMagic(_)
        | ProtoError::ZeroLengthPayload
        | ProtoError::ShortRead { .. }
        | ProtoError::PayloadTooLarge(_) => ErrorCode::Framing,
        ProtoError::Unmarshalling(_) | ProtoError::UnknownTypeTag(_) => ErrorCode::Unmarshalling,
        ProtoError::Marshalling(_) => ErrorCode::Internal,
    }
}

fn crypto_code(_err: &CryptoError) -> ErrorCode {
    ErrorCode::Decryption
}
