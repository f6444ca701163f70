//! Identities and addresses: the cryptographic-identity layer of the
//! protocol, built on top of `airdispatch-crypto`'s primitives.

use serde::{Deserialize, Serialize};

use airdispatch_crypto::address::Fingerprint;
use airdispatch_crypto::keys::{AdRsaPublicKey, EcdsaKeyPair, EcdsaPublicKey, RsaKeyPair};

use crate::error::{EnvelopeError, EnvelopeResult};

/// An address's fingerprint: either derived from a real signing key, or the
/// sentinel for the special `Public` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFingerprint {
    /// The special `Public` address (`{0}` on the wire).
    Public,
    /// A real, checksum-verified fingerprint.
    Derived(Fingerprint),
}

/// An AirDispatch address: public material only, freely shareable.
///
/// Constructed either literally (from a fingerprint the caller already
/// trusts), or resolved (returned by a [`crate::router::Router`] with
/// location and keys filled in). Never mutated in place once built - a
/// caller that learns more about an address (e.g. its location) constructs a
/// new, more complete `Address` rather than patching this one.
#[derive(Debug, Clone)]
pub struct Address {
    fingerprint: AddressFingerprint,
    location: Option<String>,
    encryption_key: Option<AdRsaPublicKey>,
    signing_key: Option<EcdsaPublicKey>,
    alias: Option<String>,
}

impl Address {
    /// The sentinel address representing "the public", used for self-addressed
    /// public-feed entries.
    #[must_use]
    pub fn public() -> Self {
        Self {
            fingerprint: AddressFingerprint::Public,
            location: None,
            encryption_key: None,
            signing_key: None,
            alias: None,
        }
    }

    /// Builds the address derived from a signing public key, with no location
    /// or alias known yet.
    #[must_use]
    pub fn from_signing_key(signing_key: EcdsaPublicKey) -> Self {
        let fingerprint = Fingerprint::derive(&signing_key.to_bytes());
        Self {
            fingerprint: AddressFingerprint::Derived(fingerprint),
            location: None,
            encryption_key: None,
            signing_key: Some(signing_key),
            alias: None,
        }
    }

    /// Builds an address from already-checksum-verified fingerprint bytes,
    /// with no keys or location known (e.g. the `header.from` of an
    /// unverified message, before reconstruction fills in the rest).
    #[must_use]
    pub fn from_fingerprint_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes == [0] {
            return Some(Self::public());
        }
        let fingerprint = Fingerprint::from_checked_bytes(bytes)?;
        Some(Self {
            fingerprint: AddressFingerprint::Derived(fingerprint),
            location: None,
            encryption_key: None,
            signing_key: None,
            alias: None,
        })
    }

    /// Returns a copy of this address with a location attached.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns a copy of this address with an encryption key attached.
    #[must_use]
    pub fn with_encryption_key(mut self, key: AdRsaPublicKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Returns a copy of this address with a signing key attached.
    #[must_use]
    pub fn with_signing_key(mut self, key: EcdsaPublicKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Returns a copy of this address with an alias attached.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// True if this is the special `Public` address.
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self.fingerprint, AddressFingerprint::Public)
    }

    /// Raw fingerprint bytes as they appear on the wire (`[0]` for Public).
    #[must_use]
    pub fn fingerprint_bytes(&self) -> Vec<u8> {
        match self.fingerprint {
            AddressFingerprint::Public => vec![0],
            AddressFingerprint::Derived(fp) => fp.as_bytes().to_vec(),
        }
    }

    /// Lowercase hex fingerprint, used as the key in per-recipient header
    /// tables and mailbox lookups.
    #[must_use]
    pub fn fingerprint_hex(&self) -> String {
        match self.fingerprint {
            AddressFingerprint::Public => "00".to_string(),
            AddressFingerprint::Derived(fp) => fp.to_hex(),
        }
    }

    /// The server location (`host:port`), if known.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The RSA encryption public key, if known.
    #[must_use]
    pub fn encryption_key(&self) -> Option<&AdRsaPublicKey> {
        self.encryption_key.as_ref()
    }

    /// The ECDSA signing public key, if known.
    #[must_use]
    pub fn signing_key(&self) -> Option<&EcdsaPublicKey> {
        self.signing_key.as_ref()
    }

    /// The alias, if known.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint_hex() == other.fingerprint_hex()
    }
}
impl Eq for Address {}

/// A complete AirDispatch user: signing and encryption private keys, plus
/// the address they derive.
///
/// # Security
///
/// Holding an `Identity` is enough to impersonate the corresponding address
/// on the network; it must never be serialized except through
/// [`IdentityBlob`], and never logged.
#[derive(Clone)]
pub struct Identity {
    signing_key_pair: EcdsaKeyPair,
    encryption_key_pair: RsaKeyPair,
    location: Option<String>,
    alias: Option<String>,
}

impl Identity {
    /// Generates a fresh identity with new ECDSA and RSA key pairs.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Crypto`] if RSA key generation fails.
    pub fn generate() -> EnvelopeResult<Self> {
        Ok(Self {
            signing_key_pair: EcdsaKeyPair::generate(),
            encryption_key_pair: RsaKeyPair::generate().map_err(EnvelopeError::Crypto)?,
            location: None,
            alias: None,
        })
    }

    /// Attaches the server location this identity publishes as its own.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attaches a human-readable alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Borrows the ECDSA signing key pair.
    #[must_use]
    pub fn signing_key_pair(&self) -> &EcdsaKeyPair {
        &self.signing_key_pair
    }

    /// Borrows the RSA encryption key pair.
    #[must_use]
    pub fn encryption_key_pair(&self) -> &RsaKeyPair {
        &self.encryption_key_pair
    }

    /// Returns this identity's own address, with its own keys and location
    /// filled in.
    #[must_use]
    pub fn address(&self) -> Address {
        let mut address = Address::from_signing_key(self.signing_key_pair.public_key())
            .with_encryption_key(self.encryption_key_pair.public_key());
        if let Some(location) = &self.location {
            address = address.with_location(location.clone());
        }
        if let Some(alias) = &self.alias {
            address = address.with_alias(alias.clone());
        }
        address
    }
}

/// Opaque, versioned persistence format for an [`Identity`].
///
/// The core only guarantees that a reader tolerates an unknown version
/// prefix; the surrounding file format (path, permissions, passphrase
/// wrapping) is out of scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityBlob {
    version: u8,
    signing_key_scalar: Vec<u8>,
    rsa_private_key_der: Vec<u8>,
    location: Option<String>,
    alias: Option<String>,
}

/// The only blob version this implementation knows how to read or write.
pub const IDENTITY_BLOB_VERSION: u8 = 1;

impl Identity {
    /// Serializes this identity's private key material into an opaque,
    /// versioned blob.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::IncorrectParameter`] if the RSA key cannot be
    /// DER-encoded.
    pub fn to_blob(&self) -> EnvelopeResult<IdentityBlob> {
        use rsa::pkcs1::EncodeRsaPrivateKey;

        let rsa_private_key_der = self
            .encryption_key_pair
            .private_key()
            .to_pkcs1_der()
            .map_err(|e| EnvelopeError::IncorrectParameter(e.to_string()))?
            .as_bytes()
            .to_vec();

        Ok(IdentityBlob {
            version: IDENTITY_BLOB_VERSION,
            signing_key_scalar: self.signing_key_pair.signing_key().to_bytes().to_vec(),
            rsa_private_key_der,
            location: self.location.clone(),
            alias: self.alias.clone(),
        })
    }

    /// Reconstructs an identity from a blob produced by [`Self::to_blob`].
    ///
    /// Tolerates (ignores) any version byte it does not recognize by still
    /// attempting to parse the rest of the blob with the current layout, as
    /// required by the persisted-state interface.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::IncorrectParameter`] if either key fails to
    /// parse.
    pub fn from_blob(blob: &IdentityBlob) -> EnvelopeResult<Self> {
        use p256::ecdsa::SigningKey;
        use rsa::pkcs1::DecodeRsaPrivateKey;

        let signing_key = SigningKey::from_slice(&blob.signing_key_scalar)
            .map_err(|e| EnvelopeError::IncorrectParameter(e.to_string()))?;
        let rsa_private_key = rsa::RsaPrivateKey::from_pkcs1_der(&blob.rsa_private_key_der)
            .map_err(|e| EnvelopeError::IncorrectParameter(e.to_string()))?;

        Ok(Self {
            signing_key_pair: EcdsaKeyPair::from_signing_key(signing_key),
            encryption_key_pair: RsaKeyPair::from_private_key(rsa_private_key),
            location: blob.location.clone(),
            alias: blob.alias.clone(),
        })
    }
}

impl IdentityBlob {
    /// Encodes this blob to CBOR bytes for on-disk persistence.
    pub fn encode(&self) -> EnvelopeResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| EnvelopeError::IncorrectParameter(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a blob from CBOR bytes, tolerating any version prefix.
    pub fn decode(bytes: &[u8]) -> EnvelopeResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| EnvelopeError::IncorrectParameter(e.to_string()))
    }
}
