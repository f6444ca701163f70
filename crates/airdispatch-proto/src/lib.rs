//! Wire framing and CBOR message schemas for the AirDispatch protocol.
//!
//! This crate owns exactly two concerns: the length-prefixed record codec
//! (section 4.1 of the protocol spec) in [`frame`], and the CBOR encoding of
//! every typed message that travels inside a record in [`wire`]. It knows
//! nothing about cryptography or connection state; `airdispatch-crypto` and
//! `airdispatch-core` build on top of it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod frame;
pub mod wire;

pub use error::{ProtoError, Result};
pub use frame::Frame;
