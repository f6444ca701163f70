//! Address derivation and checksum verification.
//!
//! An address fingerprint is `ripemd160(sha256(ecdsa-pub-bytes))` (20 bytes)
//! concatenated with the first 4 bytes of `sha256(sha256(addr))` (the
//! checksum), for 24 bytes total. The textual form is lowercase hex.

use crate::hash::sha256;

/// Length in bytes of an address fingerprint (20-byte hash + 4-byte checksum).
pub const FINGERPRINT_LEN: usize = 24;

/// Fingerprint reserved for the special `Public` address.
pub const PUBLIC_FINGERPRINT: [u8; 1] = [0];

/// A derived AirDispatch address fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Derives a fingerprint from the wire bytes of an ECDSA public key.
    #[must_use]
    pub fn derive(ecdsa_public_key_bytes: &[u8]) -> Self {
        let hash = crate::hash::ripemd160(&sha256(ecdsa_public_key_bytes));
        let mut addr = [0u8; FINGERPRINT_LEN];
        addr[..20].copy_from_slice(&hash);
        let checksum = generate_checksum(&hash);
        addr[20..].copy_from_slice(&checksum);
        Self(addr)
    }

    /// Wraps raw bytes as a fingerprint, verifying the embedded checksum.
    ///
    /// Returns `None` if `bytes` is not [`FINGERPRINT_LEN`] bytes long or the
    /// checksum does not match (property 7: "address checksum").
    #[must_use]
    pub fn from_checked_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FINGERPRINT_LEN {
            return None;
        }
        let (body, checksum) = bytes.split_at(20);
        if generate_checksum(body) != checksum {
            return None;
        }
        let mut addr = [0u8; FINGERPRINT_LEN];
        addr.copy_from_slice(bytes);
        Some(Self(addr))
    }

    /// Wraps raw bytes without checksum verification. Used for bytes that
    /// were already checked on the way in (e.g. freshly derived).
    #[must_use]
    pub fn from_raw_unchecked(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw 24 bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex textual form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a lowercase (or mixed-case) hex string into a fingerprint,
    /// verifying its checksum.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_checked_bytes(&bytes)
    }
}

fn generate_checksum(body: &[u8]) -> [u8; 4] {
    let digest = sha256(&sha256(body));
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&digest[..4]);
    checksum
}

/// Returns whether raw address bytes carry a valid checksum (property 7).
#[must_use]
pub fn verify_address_bytes(bytes: &[u8]) -> bool {
    Fingerprint::from_checked_bytes(bytes).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derived_fingerprint_has_valid_checksum() {
        let fp = Fingerprint::derive(b"some-ecdsa-public-key-bytes");
        assert!(verify_address_bytes(fp.as_bytes()));
    }

    #[test]
    fn hex_round_trip() {
        let fp = Fingerprint::derive(b"another-key");
        let hex = fp.to_hex();
        let parsed = Fingerprint::from_hex(&hex).unwrap();
        assert_eq!(parsed, fp);
    }

    proptest! {
        /// Property 7: flipping any byte of a valid address makes verification fail.
        #[test]
        fn flipping_any_byte_invalidates_checksum(seed in proptest::collection::vec(any::<u8>(), 1..64), flip_index in 0usize..24) {
            let fp = Fingerprint::derive(&seed);
            let mut bytes = *fp.as_bytes();
            bytes[flip_index] ^= 0xff;
            prop_assert!(!verify_address_bytes(&bytes));
        }
    }
}
