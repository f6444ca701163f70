//! Error types produced by key serialization, signing, and hybrid encryption.

use thiserror::Error;

/// Errors raised by the cryptographic primitives and key codecs.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// An ECDSA or RSA public key did not parse in its expected wire format.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// ECDSA signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// RSA-OAEP or AES-CFB (en|de)cryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The system RNG could not be read.
    #[error("random number generation failed: {0}")]
    Rng(String),
}

/// Convenience alias for crypto-layer results.
pub type Result<T> = std::result::Result<T, CryptoError>;
