//! Fuzz target for `EncryptedMessage::decode`.
//!
//! Feeds arbitrary bytes straight into CBOR-decoding the outermost envelope
//! layer, covering malformed header tables, type confusion in the
//! per-recipient key entries, and oversized collections. Must never panic;
//! all invalid inputs are rejected with an error.

#![no_main]

use airdispatch_core::envelope::EncryptedMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = EncryptedMessage::decode(data);
});
