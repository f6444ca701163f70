//! Hybrid RSA + AES-256-CFB encryption used to seal a `SignedMessage` for one
//! or more recipients.
//!
//! A single random 32-byte AES key encrypts the plaintext once; that key is
//! then RSA-OAEP-SHA256 encrypted once per recipient, so multi-recipient
//! messages share one ciphertext and one AES key.

use aes::Aes256;
use cfb_mode::Decryptor as CfbDecryptor;
use cfb_mode::Encryptor as CfbEncryptor;
use cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::keys::AdRsaPublicKey;

type Aes256CfbEnc = CfbEncryptor<Aes256>;
type Aes256CfbDec = CfbDecryptor<Aes256>;

/// Size in bytes of the shared AES key (AES-256).
pub const AES_KEY_LEN: usize = 32;

/// Size in bytes of the random IV prepended to every AES-CFB ciphertext.
pub const AES_IV_LEN: usize = 16;

/// A random, per-message AES-256 key. Zeroized on drop.
#[derive(Clone, zeroize::ZeroizeOnDrop)]
pub struct AesKey([u8; AES_KEY_LEN]);

impl AesKey {
    /// Generates a fresh random key using the system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; AES_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw key bytes (e.g. after RSA-OAEP unwrapping).
    #[must_use]
    pub fn from_bytes(bytes: [u8; AES_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LEN] {
        &self.0
    }
}

/// Encrypts `plaintext` with AES-256-CFB under a fresh random IV, returning
/// `iv ‖ ciphertext`.
#[must_use]
pub fn encrypt_aes(plaintext: &[u8], key: &AesKey) -> Vec<u8> {
    let mut iv = [0u8; AES_IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut buf = plaintext.to_vec();
    let mut cipher = Aes256CfbEnc::new(key.as_bytes().into(), &iv.into());
    cipher.apply_keystream(&mut buf);

    let mut out = Vec::with_capacity(AES_IV_LEN + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    out
}

/// Decrypts `iv ‖ ciphertext` produced by [`encrypt_aes`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if `ciphertext` is shorter than the IV.
pub fn decrypt_aes(ciphertext: &[u8], key: &AesKey) -> Result<Vec<u8>> {
    if ciphertext.len() < AES_IV_LEN {
        return Err(CryptoError::Decryption(
            "ciphertext shorter than the IV".to_string(),
        ));
    }
    let (iv, body) = ciphertext.split_at(AES_IV_LEN);
    let mut buf = body.to_vec();
    let mut cipher = Aes256CfbDec::new(key.as_bytes().into(), iv.into());
    cipher.apply_keystream(&mut buf);
    Ok(buf)
}

/// RSA-OAEP-SHA256 (label `None`) encrypts an AES key under a recipient's
/// public key.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the underlying RSA operation fails.
pub fn wrap_aes_key(key: &AesKey, recipient: &AdRsaPublicKey) -> Result<Vec<u8>> {
    let padding = Oaep::new::<Sha256>();
    recipient
        .rsa_public_key()
        .encrypt(&mut rand::rngs::OsRng, padding, key.as_bytes())
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// RSA-OAEP-SHA256 decrypts a wrapped AES key under the receiver's private key.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the ciphertext does not decrypt to
/// exactly [`AES_KEY_LEN`] bytes, or the underlying RSA operation fails.
pub fn unwrap_aes_key(wrapped: &[u8], receiver: &RsaPrivateKey) -> Result<AesKey> {
    let padding = Oaep::new::<Sha256>();
    let mut bytes = receiver
        .decrypt(padding, wrapped)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    if bytes.len() != AES_KEY_LEN {
        bytes.zeroize();
        return Err(CryptoError::Decryption(format!(
            "unwrapped key was {} bytes, expected {AES_KEY_LEN}",
            bytes.len()
        )));
    }

    let mut key = [0u8; AES_KEY_LEN];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(AesKey(key))
}

/// Encrypts `plaintext` under a freshly generated AES key, returning the
/// ciphertext and the unwrapped key so the caller can wrap it per recipient.
#[must_use]
pub fn encrypt_with_random_key(plaintext: &[u8]) -> (Vec<u8>, AesKey) {
    let key = AesKey::generate();
    let ciphertext = encrypt_aes(plaintext, &key);
    (ciphertext, key)
}

/// Full hybrid decryption: unwraps the AES key with the receiver's RSA
/// private key, then AES-CFB decrypts the ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if either step fails.
pub fn hybrid_decrypt(receiver: &RsaPrivateKey, wrapped_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key = unwrap_aes_key(wrapped_key, receiver)?;
    decrypt_aes(ciphertext, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::RsaKeyPair;
    use proptest::prelude::*;

    #[test]
    fn aes_round_trip() {
        let key = AesKey::generate();
        let ciphertext = encrypt_aes(b"hello world", &key);
        assert_eq!(decrypt_aes(&ciphertext, &key).unwrap(), b"hello world");
    }

    #[test]
    fn aes_different_calls_use_different_ivs() {
        let key = AesKey::generate();
        let a = encrypt_aes(b"same plaintext", &key);
        let b = encrypt_aes(b"same plaintext", &key);
        assert_ne!(a[..AES_IV_LEN], b[..AES_IV_LEN]);
    }

    #[test]
    fn hybrid_round_trip_single_recipient() {
        let recipient = RsaKeyPair::generate().unwrap();
        let (ciphertext, key) = encrypt_with_random_key(b"signed-message-bytes");
        let wrapped = wrap_aes_key(&key, &recipient.public_key()).unwrap();

        let plaintext = hybrid_decrypt(recipient.private_key(), &wrapped, &ciphertext).unwrap();
        assert_eq!(plaintext, b"signed-message-bytes");
    }

    #[test]
    fn hybrid_shares_one_key_and_ciphertext_across_recipients() {
        let a = RsaKeyPair::generate().unwrap();
        let b = RsaKeyPair::generate().unwrap();
        let (ciphertext, key) = encrypt_with_random_key(b"broadcast message");

        let wrapped_a = wrap_aes_key(&key, &a.public_key()).unwrap();
        let wrapped_b = wrap_aes_key(&key, &b.public_key()).unwrap();

        assert_eq!(
            hybrid_decrypt(a.private_key(), &wrapped_a, &ciphertext).unwrap(),
            b"broadcast message"
        );
        assert_eq!(
            hybrid_decrypt(b.private_key(), &wrapped_b, &ciphertext).unwrap(),
            b"broadcast message"
        );
    }

    proptest! {
        #[test]
        fn aes_round_trip_arbitrary(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = AesKey::generate();
            let ciphertext = encrypt_aes(&plaintext, &key);
            prop_assert_eq!(decrypt_aes(&ciphertext, &key).unwrap(), plaintext);
        }
    }
}
