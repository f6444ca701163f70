//! Cryptographic primitives and address derivation for AirDispatch identities.
//!
//! ```text
//! ECDSA P-256 signing key  -> SHA-256(pubkey bytes) -> RIPEMD-160 -> + checksum -> Address
//! RSA-2048 encryption key  -> random AES-256 key -> AES-256-CFB(plaintext)
//!                                                 -> RSA-OAEP-SHA256(AES key) per recipient
//! ```
//!
//! This crate has no notion of a "message": it provides the hashing, key
//! serialization, signing, and hybrid-encryption building blocks that
//! `airdispatch-core`'s envelope logic composes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod address;
pub mod error;
pub mod hash;
pub mod hybrid;
pub mod keys;
pub mod signing;

pub use error::{CryptoError, Result};
