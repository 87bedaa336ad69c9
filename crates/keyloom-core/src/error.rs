//! Error taxonomy for key lifecycle operations.
//!
//! One shared enum covers the resolver, the signed-key-list builder, and both
//! engines, so per-key outcomes can be recorded uniformly in the action log.
//! Transport and transparency failures cross the boundary as opaque strings;
//! the engines never branch on their contents.

use keyloom_codec::{CodecError, Fingerprint};
use thiserror::Error;

use crate::{publish::TransparencyError, record::KeyId};

/// Errors from key lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A non-empty key set has no primary-flagged entry, or an operation
    /// that must sign found no key to sign with.
    #[error("no primary key available")]
    MissingPrimaryKey,

    /// A key referenced by the operation has no usable key material.
    #[error("missing key material for key {id}")]
    MissingKeyMaterial {
        /// The affected record.
        id: KeyId,
    },

    /// The organization key could not be decrypted under the admin's
    /// credentials. Aborts the whole run before any write.
    #[error("organization key cannot be decrypted")]
    UndecryptableOrganizationKey,

    /// The session lacks the authorization scope the operation requires.
    #[error("insufficient session scope: {scope} required")]
    InsufficientScope {
        /// The missing scope name.
        scope: String,
    },

    /// Two inputs to reconciliation share a fingerprint. Caller error; no
    /// partial output is produced.
    #[error("duplicate key fingerprint {fingerprint}")]
    DuplicateKey {
        /// The fingerprint seen more than once.
        fingerprint: Fingerprint,
    },

    /// An uploaded key matches a record that is already active.
    #[error("key {id} is already active")]
    AlreadyActive {
        /// The affected record.
        id: KeyId,
    },

    /// The new credential context decrypts strictly fewer keys than the old
    /// one. Indicates a logic bug or tampering; never recovered silently.
    #[error("inconsistent reactivation: {after} keys decryptable, previously {before}")]
    InconsistentReactivation {
        /// Decryptable key count under the old context.
        before: usize,
        /// Decryptable key count under the new context.
        after: usize,
    },

    /// A detached signature failed to verify. The affected key must not be
    /// trusted; siblings are unaffected.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// An attested signed-key-list document did not parse.
    #[error("malformed signed key list: {reason}")]
    MalformedKeyList {
        /// Parser diagnostic.
        reason: String,
    },

    /// A key record's optional wrap fields are inconsistent (token without
    /// signature or vice versa).
    #[error("malformed key record {id}")]
    MalformedRecord {
        /// The affected record.
        id: KeyId,
    },

    /// Passthrough codec failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// Passthrough transport failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Passthrough key-transparency failure.
    #[error("key transparency: {0}")]
    Transparency(String),
}

impl KeyError {
    /// Whether this error aborts a whole batch rather than a single key.
    ///
    /// Fatal errors produce no partial server submission for the affected
    /// owner; per-key errors are recorded in the action log and siblings
    /// continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UndecryptableOrganizationKey
                | Self::InsufficientScope { .. }
                | Self::InconsistentReactivation { .. }
        )
    }
}

impl From<TransparencyError> for KeyError {
    fn from(err: TransparencyError) -> Self {
        Self::Transparency(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_fatal_errors_are_flagged() {
        assert!(KeyError::UndecryptableOrganizationKey.is_fatal());
        assert!(KeyError::InsufficientScope { scope: "password".into() }.is_fatal());
        assert!(KeyError::InconsistentReactivation { before: 3, after: 2 }.is_fatal());
    }

    #[test]
    fn per_key_errors_are_not_fatal() {
        assert!(!KeyError::SignatureVerificationFailed.is_fatal());
        assert!(!KeyError::AlreadyActive { id: KeyId::from("k") }.is_fatal());
        assert!(!KeyError::MissingKeyMaterial { id: KeyId::from("k") }.is_fatal());
        assert!(!KeyError::Codec(CodecError::WrongSecret).is_fatal());
    }
}
