//! Fuzz target for wrapped-key envelope parsing.
//!
//! `public_fingerprint` runs over server-supplied wrapped bytes before any
//! secret is involved, so it must tolerate arbitrary input: garbage, valid
//! CBOR of the wrong shape, and truncated envelopes. `None` is the only
//! acceptable failure mode.

#![no_main]

use keyloom_codec::KeyCodec;
use keyloom_harness::MockCodec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let codec = MockCodec::seeded(0);
    let _ = codec.public_fingerprint(data);
});
