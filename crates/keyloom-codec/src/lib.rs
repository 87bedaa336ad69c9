//! Key material capability boundary.
//!
//! The keyloom engines never touch cryptographic primitives directly. All key
//! generation, wrapping, signing, and token encryption goes through the
//! [`KeyCodec`] trait defined here, with key pairs represented as opaque
//! handles chosen by the implementation. The engines only ever move handles
//! around, compare fingerprints, and pass wrapped bytes back to the server.
//!
//! Production implementations back the trait with a real OpenPGP-style
//! library; tests use the deterministic mock in `keyloom-harness`.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::KeyCodec;
pub use error::CodecError;
pub use types::{EncryptedToken, Fingerprint, KeyIdentity, SecretToken, Signature};
