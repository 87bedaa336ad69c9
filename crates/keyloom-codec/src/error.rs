//! Codec error type.
//!
//! Kept `Clone + Eq` so per-key outcomes can be recorded in the key action
//! log and compared in tests. Backend failures are carried as strings; the
//! engines never branch on their contents.

use thiserror::Error;

/// Errors surfaced by a [`KeyCodec`](crate::KeyCodec) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Wrapped key bytes could not be parsed at all.
    #[error("failed to decode wrapped key: {0}")]
    Decode(String),

    /// Wrapped key parsed but the supplied secret does not open it.
    #[error("wrong secret for wrapped key")]
    WrongSecret,

    /// An encrypted token could not be decrypted with the given key pair.
    #[error("token decryption failed: {0}")]
    TokenDecrypt(String),

    /// A freshly encrypted token failed its decrypt-back check.
    ///
    /// Guards against rare backend faults producing tokens nobody can open;
    /// the caller must abandon the affected key rather than upload it.
    #[error("token failed decrypt-back check after encryption")]
    TokenRoundTrip,

    /// Any other backend failure (key generation, signing, export).
    #[error("codec backend failure: {0}")]
    Backend(String),
}
