//! Fuzz target for `Frame::decode`.
//!
//! Exercises the length-prefixed record framing with arbitrary byte
//! sequences, looking for panics, integer overflows in the length
//! calculation, or buffer over-reads. All invalid inputs must return an
//! error, never panic.

#![no_main]

use airdispatch_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cursor = data;
    let _ = Frame::decode(&mut cursor);
});
