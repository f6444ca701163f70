//! CBOR-encoded wire schemas for the envelope and domain messages.
//!
//! These are byte-oriented records: key material travels as raw bytes here,
//! and `airdispatch-core` is responsible for interpreting those bytes as
//! typed cryptographic values. Every type in this module round-trips through
//! [`ciborium`], mirroring how the teacher crate's `Payload` variants encode
//! and decode.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};

/// Three-letter type tag carried by a [`WireContainer`].
pub mod type_tag {
    /// `MessageDescription`: a notification that a named message is available.
    pub const MESSAGE_DESCRIPTION: &str = "MDE";
    /// `MessageList`: a count preamble for a streamed public-feed response.
    pub const MESSAGE_LIST: &str = "MLI";
    /// `TransferMessage`: a pull-by-name request.
    pub const TRANSFER_MESSAGE: &str = "XFM";
    /// `TransferMessageList`: a pull-since-timestamp request.
    pub const TRANSFER_MESSAGE_LIST: &str = "XFL";
    /// `Mail`: a user-visible message.
    pub const MAIL: &str = "MAI";
    /// `Data`: a streamed large payload descriptor.
    pub const DATA: &str = "DAT";
    /// `Error`: a failure response.
    pub const ERROR: &str = "ERR";
    /// `AddressRegistration`: a tracker self-publication.
    pub const REGISTRATION: &str = "REG";
    /// `AddressRequest`: a tracker lookup.
    pub const QUERY: &str = "QUE";
    /// `AddressResponse`: a tracker lookup reply.
    pub const RESPONSE: &str = "RES";
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| ProtoError::Marshalling(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtoError::Unmarshalling(e.to_string()))
}

/// Wire form of [`Header`](https://docs.rs) style message metadata: who sent
/// it, who it is addressed to, when, and (for the sender) their encryption
/// key and optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHeader {
    /// Sender's address fingerprint bytes.
    pub from_addr: Vec<u8>,
    /// Recipient's address fingerprint bytes, or `[0]` for the Public address.
    pub to_addr: Vec<u8>,
    /// Unix seconds at creation time.
    pub timestamp: i64,
    /// Sender's RSA public key bytes (`AD-RSA` format), if advertised.
    pub encryption_key: Vec<u8>,
    /// Optional human-readable alias for the sender.
    pub alias: String,
}

/// Wire form of the innermost signed container: header, typed payload, and
/// a three-letter type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireContainer {
    /// Message metadata.
    pub header: WireHeader,
    /// Opaque, type-specific payload bytes.
    pub data: Vec<u8>,
    /// Three-letter type tag (see [`type_tag`]).
    pub type_tag: String,
}

impl WireContainer {
    /// Encodes this container to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes a container from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// One ECDSA signature over a `SignedMessage`'s data bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSignature {
    /// Big-endian `r` component.
    pub r: Vec<u8>,
    /// Big-endian `s` component.
    pub s: Vec<u8>,
    /// The signer's ECDSA public key bytes (65-byte tagged form).
    pub signing_key: Vec<u8>,
}

/// Wire form of a signed container: the container bytes plus one or more
/// signatures over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSignedMessage {
    /// The marshaled [`WireContainer`] bytes that were signed.
    pub data: Vec<u8>,
    /// Ordered signatures over `data`.
    pub signatures: Vec<WireSignature>,
    /// Tag identifying the signing function (`"ecdsa-p256-sha256"`).
    pub signing_func: String,
}

impl WireSignedMessage {
    /// Encodes this signed message to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes a signed message from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// Tag for a recipient's encryption-header entry.
pub mod encryption_tag {
    /// The AES key is RSA-OAEP-SHA256 encrypted for this recipient.
    pub const RSA: &str = "airdispat.ch/crypto/rsa2048-aes256";
    /// No encryption: the ciphertext field is already plaintext.
    pub const NONE: &str = "airdispat.ch/crypto/none";
}

/// Per-recipient entry in an `EncryptedMessage`'s header table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEncryptedHeader {
    /// Recipient address fingerprint bytes, or `[0]` for Public.
    pub to_addr: Vec<u8>,
    /// Encryption function tag (see [`encryption_tag`]).
    pub enc_fun: String,
    /// The (possibly RSA-wrapped) AES key for this recipient.
    pub key: Vec<u8>,
}

/// Wire form of the outermost encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEncryptedMessage {
    /// Ciphertext (or, for the `None` tag, plaintext `WireSignedMessage` bytes).
    pub data: Vec<u8>,
    /// One entry per intended recipient.
    pub header: Vec<WireEncryptedHeader>,
}

impl WireEncryptedMessage {
    /// Encodes this encrypted message to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes an encrypted message from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// A notification that a named message is available at a stated location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessageDescription {
    /// Server-chosen opaque identifier for the stored message.
    pub name: String,
    /// Host:port of the server holding the payload.
    pub location: String,
    /// Reserved for future replay protection; unused by this implementation.
    pub nonce: u64,
}

impl WireMessageDescription {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// A pull-by-name request for a previously advertised message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransferMessage {
    /// Name of the message being requested.
    pub name: String,
    /// Textual (hex) address of the message's author.
    pub author: String,
}

impl WireTransferMessage {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// A request for an author's public feed since a given timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransferMessageList {
    /// Textual (hex) address of the feed's author.
    pub author: String,
    /// Unix seconds; only items stored strictly after this are returned.
    pub since: u64,
}

impl WireTransferMessageList {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// Count preamble for a streamed list of `Mail` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessageList {
    /// Number of `Mail` records that follow on the connection.
    pub length: u64,
}

impl WireMessageList {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// One named component of a [`WireMail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMailComponent {
    /// Component type name, e.g. `"ch.airdispat.notes.title"`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Component payload bytes.
    pub data: Vec<u8>,
}

/// A user-visible message: an unordered set of named components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WireMail {
    /// Components, unique by `type`.
    pub components: Vec<WireMailComponent>,
}

impl WireMail {
    /// Encodes this mail to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Marshalling`] if two components share the same
    /// `type`, since that would violate the "unique by `type`" invariant for
    /// whoever decodes this mail back.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut seen = std::collections::HashSet::with_capacity(self.components.len());
        for component in &self.components {
            if !seen.insert(component.ty.as_str()) {
                return Err(ProtoError::Marshalling(format!(
                    "duplicate mail component type {:?}",
                    component.ty
                )));
            }
        }
        encode_cbor(self)
    }

    /// Decodes a mail from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// Wire form of a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Numeric error code (see `airdispatch-server::error::ErrorCode`).
    pub code: u32,
    /// Human-readable description.
    pub description: String,
}

impl WireError {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// A tracker lookup by fingerprint or alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAddressRequest {
    /// The fingerprint (hex) or alias being queried for.
    pub query: String,
    /// True if `query` is an alias rather than a fingerprint.
    pub is_alias: bool,
    /// Redirect-table selector (`MAIL`, `ALE`, `TX`, or `*`).
    pub kind: String,
}

impl WireAddressRequest {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// A tracker lookup reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAddressResponse {
    /// Host:port of the resolved address's server.
    pub location: String,
    /// Resolved address fingerprint bytes.
    pub address: Vec<u8>,
    /// Resolved address's RSA public key bytes (`AD-RSA` format).
    pub public_key: Vec<u8>,
    /// Resolved address's ECDSA public key bytes (65-byte tagged form).
    pub signing_key: Vec<u8>,
}

impl WireAddressResponse {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// One `kind -> location` redirect entry in a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRedirect {
    /// Redirect-table selector.
    pub kind: String,
    /// Host:port this kind of traffic should be routed to.
    pub location: String,
}

/// A tracker self-publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAddressRegistration {
    /// Registrant's address fingerprint bytes.
    pub fingerprint: Vec<u8>,
    /// Registrant's RSA public key bytes (`AD-RSA` format).
    pub public_key: Vec<u8>,
    /// Registrant's ECDSA public key bytes (65-byte tagged form).
    pub signing_key: Vec<u8>,
    /// Default server location.
    pub location: String,
    /// Optional alias to register alongside the fingerprint.
    pub alias: String,
    /// Per-kind location overrides.
    pub redirects: Vec<WireRedirect>,
}

impl WireAddressRegistration {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

/// Descriptor for a large payload that streams alongside this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireData {
    /// `sha256` of the decrypted plaintext.
    pub hash: Vec<u8>,
    /// Length of the streamed body, in bytes, including the prepended IV.
    /// A reader must `LimitRead` the connection to exactly this many bytes
    /// before decrypting.
    pub length: u64,
    /// The (possibly RSA-wrapped) AES key for the streamed body.
    pub key: Vec<u8>,
    /// Server-chosen opaque identifier.
    pub name: String,
    /// Suggested filename for the payload.
    pub filename: String,
}

impl WireData {
    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_round_trip() {
        let container = WireContainer {
            header: WireHeader {
                from_addr: vec![1, 2, 3],
                to_addr: vec![4, 5, 6],
                timestamp: 1_700_000_000,
                encryption_key: vec![],
                alias: String::new(),
            },
            data: b"payload".to_vec(),
            type_tag: type_tag::MAIL.to_string(),
        };

        let bytes = container.encode().unwrap();
        let decoded = WireContainer::decode(&bytes).unwrap();
        assert_eq!(decoded, container);
    }

    #[test]
    fn encrypted_message_round_trip_preserves_header_table() {
        let message = WireEncryptedMessage {
            data: b"ciphertext".to_vec(),
            header: vec![
                WireEncryptedHeader {
                    to_addr: vec![9, 9, 9],
                    enc_fun: encryption_tag::RSA.to_string(),
                    key: vec![1; 256],
                },
                WireEncryptedHeader {
                    to_addr: vec![0],
                    enc_fun: encryption_tag::NONE.to_string(),
                    key: vec![0],
                },
            ],
        };

        let bytes = message.encode().unwrap();
        let decoded = WireEncryptedMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.header.len(), 2);
        assert_eq!(decoded, message);
    }

    #[test]
    fn mail_round_trip() {
        let mail = WireMail {
            components: vec![WireMailComponent {
                ty: "test".to_string(),
                data: b"hello world".to_vec(),
            }],
        };
        let bytes = mail.encode().unwrap();
        assert_eq!(WireMail::decode(&bytes).unwrap(), mail);
    }

    #[test]
    fn mail_rejects_duplicate_component_types() {
        let mail = WireMail {
            components: vec![
                WireMailComponent { ty: "ch.airdispat.notes.title".to_string(), data: b"a".to_vec() },
                WireMailComponent { ty: "ch.airdispat.notes.title".to_string(), data: b"b".to_vec() },
            ],
        };
        let err = mail.encode().unwrap_err();
        assert!(matches!(err, ProtoError::Marshalling(_)));
    }

    #[test]
    fn decode_garbage_is_unmarshalling_error() {
        let err = WireContainer::decode(&[0xff, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ProtoError::Unmarshalling(_)));
    }
}
