//! Deterministic wire serialization for ECDSA and RSA public keys.
//!
//! Neither format is a standard SEC1 or PKCS#1 encoding: both fix their own
//! tag bytes and field layout, matching what the rest of the AirDispatch
//! network already expects on the wire.

use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, PublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::error::{CryptoError, Result};

/// One-byte tag prefixing a serialized ECDSA public key.
pub const ECDSA_TAG: u8 = 0x03;

/// Length in bytes of a serialized ECDSA public key (tag + 32-byte X + 32-byte Y).
pub const ECDSA_PUBLIC_KEY_LEN: usize = 65;

/// ASCII prefix for a serialized RSA public key.
pub const RSA_PREFIX: &[u8] = b"AD-RSA";

/// An ECDSA P-256 public (verifying) key.
#[derive(Debug, Clone)]
pub struct EcdsaPublicKey(VerifyingKey);

impl EcdsaPublicKey {
    /// Wraps an already-parsed verifying key.
    #[must_use]
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self(key)
    }

    /// Borrows the underlying verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// Serializes to the wire format: `0x03 ‖ X(32, big-endian) ‖ Y(32, big-endian)`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ECDSA_PUBLIC_KEY_LEN] {
        let point = self.0.to_encoded_point(false);
        let uncompressed = point.as_bytes();
        debug_assert_eq!(uncompressed.len(), ECDSA_PUBLIC_KEY_LEN);
        let mut out = [0u8; ECDSA_PUBLIC_KEY_LEN];
        out[0] = ECDSA_TAG;
        out[1..].copy_from_slice(&uncompressed[1..]);
        out
    }

    /// Parses the wire format produced by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyEncoding`] if the length or tag byte
    /// is wrong, or if the coordinates do not describe a point on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ECDSA_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidKeyEncoding(format!(
                "expected {ECDSA_PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != ECDSA_TAG {
            return Err(CryptoError::InvalidKeyEncoding(format!(
                "expected tag byte {ECDSA_TAG:#x}, got {:#x}",
                bytes[0]
            )));
        }

        let mut sec1 = [0u8; ECDSA_PUBLIC_KEY_LEN];
        sec1[0] = 0x04; // SEC1 uncompressed-point tag
        sec1[1..].copy_from_slice(&bytes[1..]);

        let encoded = EncodedPoint::from_bytes(sec1)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let public_key = Option::<PublicKey>::from(PublicKey::from_encoded_point(&encoded))
            .ok_or_else(|| CryptoError::InvalidKeyEncoding("point not on curve".to_string()))?;

        Ok(Self(VerifyingKey::from(public_key)))
    }

    /// Verifies a signature over a pre-hashed message (see [`crate::signing`]).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the signature does not verify.
    pub fn verify_prehash(&self, hash: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_prehash(hash, signature)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

/// An ECDSA P-256 signing key pair.
#[derive(Clone)]
pub struct EcdsaKeyPair {
    signing_key: SigningKey,
}

impl EcdsaKeyPair {
    /// Generates a fresh key pair using the system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Wraps an already-parsed signing key.
    #[must_use]
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Borrows the private signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Returns this key pair's public half.
    #[must_use]
    pub fn public_key(&self) -> EcdsaPublicKey {
        EcdsaPublicKey(*self.signing_key.verifying_key())
    }

    /// Signs a pre-hashed message (see [`crate::signing::sign_payload`]).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the underlying RNG fails.
    pub fn sign_prehash(&self, hash: &[u8]) -> Result<Signature> {
        self.signing_key
            .sign_prehash(hash)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

/// An RSA-2048 public (encryption) key.
#[derive(Debug, Clone)]
pub struct AdRsaPublicKey(RsaPublicKey);

impl AdRsaPublicKey {
    /// Wraps an already-parsed RSA public key.
    #[must_use]
    pub fn from_rsa_public_key(key: RsaPublicKey) -> Self {
        Self(key)
    }

    /// Borrows the underlying RSA public key.
    #[must_use]
    pub fn rsa_public_key(&self) -> &RsaPublicKey {
        &self.0
    }

    /// Serializes to the wire format:
    /// `"AD-RSA" ‖ int32be(8) ‖ int64be(exponent) ‖ int32be(modulus_len) ‖ modulus`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let exponent: u64 = self.0.e().try_into().unwrap_or(u64::MAX);
        let modulus = self.0.n().to_bytes_be();

        let mut out = Vec::with_capacity(RSA_PREFIX.len() + 4 + 8 + 4 + modulus.len());
        out.extend_from_slice(RSA_PREFIX);
        out.extend_from_slice(&8u32.to_be_bytes());
        out.extend_from_slice(&exponent.to_be_bytes());
        out.extend_from_slice(&u32::try_from(modulus.len()).unwrap_or(u32::MAX).to_be_bytes());
        out.extend_from_slice(&modulus);
        out
    }

    /// Parses the wire format produced by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyEncoding`] if the prefix, declared
    /// exponent length, or declared modulus length do not match the bytes
    /// actually present.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;

        if cursor.len() < RSA_PREFIX.len() || &cursor[..RSA_PREFIX.len()] != RSA_PREFIX {
            return Err(CryptoError::InvalidKeyEncoding(
                "missing AD-RSA prefix".to_string(),
            ));
        }
        cursor = &cursor[RSA_PREFIX.len()..];

        let exponent_len = read_u32(&mut cursor)?;
        if exponent_len != 8 {
            return Err(CryptoError::InvalidKeyEncoding(format!(
                "expected exponent length 8, got {exponent_len}"
            )));
        }
        let exponent = read_u64(&mut cursor)?;

        let modulus_len = read_u32(&mut cursor)? as usize;
        if cursor.len() != modulus_len {
            return Err(CryptoError::InvalidKeyEncoding(format!(
                "expected {modulus_len} modulus bytes, got {}",
                cursor.len()
            )));
        }

        let n = BigUint::from_bytes_be(cursor);
        let e = BigUint::from(exponent);
        let key = RsaPublicKey::new(n, e)
            .map_err(|err| CryptoError::InvalidKeyEncoding(err.to_string()))?;
        Ok(Self(key))
    }
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.len() < 4 {
        return Err(CryptoError::InvalidKeyEncoding(
            "unexpected end of key bytes".to_string(),
        ));
    }
    let (head, tail) = cursor.split_at(4);
    *cursor = tail;
    Ok(u32::from_be_bytes(head.try_into().unwrap_or([0; 4])))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.len() < 8 {
        return Err(CryptoError::InvalidKeyEncoding(
            "unexpected end of key bytes".to_string(),
        ));
    }
    let (head, tail) = cursor.split_at(8);
    *cursor = tail;
    Ok(u64::from_be_bytes(head.try_into().unwrap_or([0; 8])))
}

/// An RSA-2048 key pair.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Generates a fresh 2048-bit RSA key pair using the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Rng`] if key generation fails.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self { private_key })
    }

    /// Wraps an already-parsed private key.
    #[must_use]
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    /// Borrows the private key.
    #[must_use]
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Returns this key pair's public half.
    #[must_use]
    pub fn public_key(&self) -> AdRsaPublicKey {
        AdRsaPublicKey(self.private_key.to_public_key())
    }
}
