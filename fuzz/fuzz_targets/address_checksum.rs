//! Fuzz target for `verify_address_bytes` / `Fingerprint::from_checked_bytes`.
//!
//! Arbitrary-length byte strings should never panic the checksum verifier,
//! regardless of length or content (property 7: "address checksum").

#![no_main]

use airdispatch_crypto::address::verify_address_bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = verify_address_bytes(data);
});
