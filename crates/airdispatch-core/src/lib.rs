//! Identity, envelope, and router logic for the AirDispatch protocol: the
//! layer above wire framing and cryptographic primitives, and below the
//! mailserver dispatcher.
//!
//! ```text
//! airdispatch-proto   (frame codec, CBOR wire schemas)
//!        |
//! airdispatch-crypto  (ECDSA, RSA, AES, hashing, addresses)
//!        |
//! airdispatch-core    (identity, envelope, router) <- you are here
//!        |
//! airdispatch-server / airdispatch-client
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod router;

pub use env::{Environment, TokioEnvironment};
pub use error::{EnvelopeError, EnvelopeResult, RouterError, RouterResult};
pub use identity::{Address, Identity, IdentityBlob};
