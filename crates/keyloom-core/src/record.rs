//! Server-side key records and their decrypted counterparts.

use std::fmt;

use bytes::Bytes;
use keyloom_codec::{EncryptedToken, Signature};
use serde::{Deserialize, Serialize};

use crate::{error::KeyError, flags::KeyFlags};

/// Server-assigned identifier of a key record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Wrap a server-assigned id string.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// How a record's private key is wrapped at rest.
///
/// Decided once when the record is parsed off the wire; the rest of the code
/// matches on this enum instead of re-checking optional-field presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWrapping {
    /// Wrapped directly under the passphrase derived from the account
    /// password. Pre-migration format.
    Legacy,

    /// Wrapped under a random token that is encrypted to the user key (and
    /// optionally the organization key) and signed by each independently.
    V2 {
        /// The wrap token, encrypted to the user key's public half.
        token: EncryptedToken,
        /// Detached user-key signature over the plaintext token.
        signature: Signature,
        /// Detached organization-key signature, present for managed members.
        /// Either signature alone validates authenticity.
        org_signature: Option<Signature>,
    },
}

impl KeyWrapping {
    /// Classify from the optional wire fields.
    ///
    /// Token and signature must be present together; one without the other is
    /// a malformed record.
    pub fn from_parts(
        id: &KeyId,
        token: Option<EncryptedToken>,
        signature: Option<Signature>,
        org_signature: Option<Signature>,
    ) -> Result<Self, KeyError> {
        match (token, signature) {
            (Some(token), Some(signature)) => Ok(Self::V2 { token, signature, org_signature }),
            (None, None) => Ok(Self::Legacy),
            _ => Err(KeyError::MalformedRecord { id: id.clone() }),
        }
    }
}

/// A key as stored server-side for a user or an address.
///
/// Immutable except for `flags`, `primary`, and the wrap fields, which change
/// only through a full re-wrap submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Server-assigned id.
    pub id: KeyId,
    /// The wrapped private key blob. Only the codec understands its layout.
    pub wrapped_private_key: Bytes,
    /// Legacy or v2 wrapping, decided at parse time.
    pub wrapping: KeyWrapping,
    /// Capability flags.
    pub flags: KeyFlags,
    /// Whether the server marks this record primary.
    pub primary: bool,
    /// Key format version as reported by the server.
    pub version: u8,
}

impl KeyRecord {
    /// Whether this record already carries the v2 token-based wrapping.
    pub fn is_migrated(&self) -> bool {
        matches!(self.wrapping, KeyWrapping::V2 { .. })
    }
}

/// Result of successfully unwrapping a [`KeyRecord`].
///
/// The handle is issued by the codec and never serialized here.
#[derive(Debug, Clone)]
pub struct DecryptedKey<K> {
    /// Id of the record this key was unwrapped from.
    pub id: KeyId,
    /// Opaque decrypted key pair handle.
    pub key_pair: K,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_requires_token_and_signature_together() {
        let id = KeyId::from("k1");
        let token = EncryptedToken::new("enc");
        let sig = Signature::new("sig");

        assert_eq!(
            KeyWrapping::from_parts(&id, None, None, None),
            Ok(KeyWrapping::Legacy)
        );
        assert!(matches!(
            KeyWrapping::from_parts(&id, Some(token.clone()), Some(sig.clone()), None),
            Ok(KeyWrapping::V2 { .. })
        ));
        assert_eq!(
            KeyWrapping::from_parts(&id, Some(token), None, None),
            Err(KeyError::MalformedRecord { id: id.clone() })
        );
        assert_eq!(
            KeyWrapping::from_parts(&id, None, Some(sig), None),
            Err(KeyError::MalformedRecord { id })
        );
    }
}
