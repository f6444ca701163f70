//! SHA-256 and RIPEMD-160 hashing, used by address derivation and signing.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Returns `sha256(payload)`.
#[must_use]
pub fn sha256(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Returns `ripemd160(payload)`.
#[must_use]
pub fn ripemd160(payload: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(payload);
    hasher.finalize().into()
}
