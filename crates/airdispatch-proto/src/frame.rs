//! Length-prefixed record framing.
//!
//! Every record on the wire is `"AD" ‖ int32be(length) ‖ payload[length]`.
//! There is no second-level record framing: higher layers embed their own
//! lists with an explicit count (see [`crate::wire::WireMessageList`]).

use bytes::{Buf, BufMut};

use crate::error::{ProtoError, Result};

/// Two-byte magic every record starts with.
pub const MAGIC: [u8; 2] = *b"AD";

/// Size of the fixed record prefix: 2-byte magic + 4-byte big-endian length.
pub const HEADER_SIZE: usize = 6;

/// Upper bound on a single record's payload. Not part of the wire format
/// invariants in section 4.1, but a sane implementation-defined ceiling so a
/// malicious or corrupt peer cannot force an unbounded allocation.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// A single decoded record: the payload bytes that followed a valid
/// `"AD" ‖ int32be(length)` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    /// Wraps a payload so it can be encoded onto the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::ZeroLengthPayload`] if `payload` is empty, or
    /// [`ProtoError::PayloadTooLarge`] if it exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn new(payload: Vec<u8>) -> Result<Self> {
        if payload.is_empty() {
            return Err(ProtoError::ZeroLengthPayload);
        }
        let len = u32::try_from(payload.len()).map_err(|_| ProtoError::PayloadTooLarge(u32::MAX))?;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge(len));
        }
        Ok(Self { payload })
    }

    /// Borrows the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the frame, returning the owned payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Encodes the six-byte prefix and payload in a single pass.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::PayloadTooLarge`] if the payload no longer fits
    /// in an `int32be` length (defensive; construction already enforces this).
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let len = u32::try_from(self.payload.len())
            .map_err(|_| ProtoError::PayloadTooLarge(u32::MAX))?;
        dst.put_slice(&MAGIC);
        dst.put_u32(len);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decodes one record from the front of `src`, advancing it past the
    /// consumed bytes. `src` may contain trailing data beyond this record;
    /// only the first record is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::ShortRead`] if fewer than [`HEADER_SIZE`] bytes
    /// are available, [`ProtoError::BadMagic`] if the first two bytes are not
    /// `"AD"`, [`ProtoError::ZeroLengthPayload`] if the declared length is
    /// zero, [`ProtoError::PayloadTooLarge`] if it exceeds the cap, or
    /// [`ProtoError::ShortRead`] again if `src` does not contain the full
    /// declared payload.
    pub fn decode(src: &mut impl Buf) -> Result<Self> {
        if src.remaining() < HEADER_SIZE {
            return Err(ProtoError::ShortRead {
                expected: HEADER_SIZE,
                got: src.remaining(),
            });
        }

        let mut magic = [0u8; 2];
        src.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(ProtoError::BadMagic(magic));
        }

        let len = src.get_u32();
        if len == 0 {
            return Err(ProtoError::ZeroLengthPayload);
        }
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge(len));
        }

        let len = len as usize;
        if src.remaining() < len {
            return Err(ProtoError::ShortRead {
                expected: len,
                got: src.remaining(),
            });
        }

        let mut payload = vec![0u8; len];
        src.copy_to_slice(&mut payload);
        Ok(Self { payload })
    }
}
