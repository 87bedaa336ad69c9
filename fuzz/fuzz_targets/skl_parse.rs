//! Fuzz target for signed-key-list document parsing.
//!
//! The document comes off the wire as an untrusted JSON string. Parsing must
//! reject malformed input with an error and never panic, whatever the
//! nesting, field types, or encoding of the bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = keyloom_core::skl::parse_data(text);
    }
});
