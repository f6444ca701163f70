//! ECDSA signing and verification over a SHA-256 digest.
//!
//! `SignPayload`/`VerifyPayload` in the original protocol operate on an
//! already-hashed digest rather than re-hashing internally, so this module
//! signs and verifies pre-hashed messages (see [`ecdsa::signature::hazmat`]).

use p256::ecdsa::Signature;

use crate::error::{CryptoError, Result};
use crate::hash::sha256;
use crate::keys::{EcdsaKeyPair, EcdsaPublicKey};

/// Big-endian `r` and `s` components of an ECDSA signature, plus the
/// signer's public key bytes - the three fields carried in a
/// [`airdispatch_proto::wire::WireSignature`].
#[derive(Debug, Clone)]
pub struct SignatureParts {
    /// Big-endian `r`.
    pub r: Vec<u8>,
    /// Big-endian `s`.
    pub s: Vec<u8>,
}

impl SignatureParts {
    fn from_signature(sig: &Signature) -> Self {
        let bytes = sig.to_bytes();
        let (r, s) = bytes.split_at(32);
        Self {
            r: r.to_vec(),
            s: s.to_vec(),
        }
    }

    fn to_signature(&self) -> Result<Signature> {
        if self.r.len() != 32 || self.s.len() != 32 {
            return Err(CryptoError::Signing(format!(
                "expected 32-byte r/s, got r={} s={}",
                self.r.len(),
                self.s.len()
            )));
        }
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        Signature::from_slice(&bytes).map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

/// Signs `sha256(payload)` with the given key pair.
///
/// # Errors
///
/// Returns [`CryptoError::Signing`] if the underlying signer fails.
pub fn sign_payload(key_pair: &EcdsaKeyPair, payload: &[u8]) -> Result<SignatureParts> {
    let digest = sha256(payload);
    let signature = key_pair.sign_prehash(&digest)?;
    Ok(SignatureParts::from_signature(&signature))
}

/// Verifies a signature over `sha256(payload)` under the given public key.
///
/// Returns `true` only if the signature is well-formed and verifies.
#[must_use]
pub fn verify_payload(public_key: &EcdsaPublicKey, payload: &[u8], signature: &SignatureParts) -> bool {
    let Ok(sig) = signature.to_signature() else {
        return false;
    };
    let digest = sha256(payload);
    public_key.verify_prehash(&digest, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let key_pair = EcdsaKeyPair::generate();
        let signature = sign_payload(&key_pair, b"hello world").unwrap();
        assert!(verify_payload(&key_pair.public_key(), b"hello world", &signature));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let key_pair = EcdsaKeyPair::generate();
        let signature = sign_payload(&key_pair, b"hello world").unwrap();
        assert!(!verify_payload(&key_pair.public_key(), b"goodbye world", &signature));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let key_pair = EcdsaKeyPair::generate();
        let mut signature = sign_payload(&key_pair, b"hello world").unwrap();
        signature.s[0] ^= 0xff;
        assert!(!verify_payload(&key_pair.public_key(), b"hello world", &signature));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key_pair = EcdsaKeyPair::generate();
        let other = EcdsaKeyPair::generate();
        let signature = sign_payload(&key_pair, b"hello world").unwrap();
        assert!(!verify_payload(&other.public_key(), b"hello world", &signature));
    }
}
