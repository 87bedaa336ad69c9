//! Deterministic test harness for the keyloom engines.
//!
//! `MockCodec` is a pure-software stand-in for a real asymmetric codec: key
//! pairs are 32-byte seeds, signatures are keyed MACs, and wrapped keys are
//! CBOR envelopes sealed with a digest-derived pad. None of it is
//! cryptography, but it preserves the properties the engines depend on:
//! wrong secrets fail to unwrap, fingerprints are stable per key, tokens
//! only open for their recipients, and everything is reproducible from a
//! seed.
//!
//! `MockTransport` records every server call for assertion and injects
//! failures on demand; `MockTransparency` does the same for key-transparency
//! registrations.

pub mod fixtures;
pub mod mock_codec;
pub mod mock_transparency;
pub mod mock_transport;

pub use fixtures::{address_owner, legacy_record, user_owner, v2_record};
pub use mock_codec::{MockCodec, MockKeyPair};
pub use mock_transparency::{MockTransparency, TransparencyEvent};
pub use mock_transport::{MockTransport, TransportCall};
