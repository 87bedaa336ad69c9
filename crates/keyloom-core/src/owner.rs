//! Key owners: the user's global key set and per-address key sets.

use std::fmt;

use keyloom_codec::{Fingerprint, KeyIdentity};
use serde::{Deserialize, Serialize};

use crate::{record::KeyRecord, skl::SignedKeyList};

/// Server-assigned identifier of a key owner (user or address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a server-assigned owner id.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A per-alias address with its key records and attested key list.
#[derive(Debug, Clone)]
pub struct Address {
    /// Owner id of the address.
    pub id: OwnerId,
    /// Email the address serves. Keys generated or reactivated for this
    /// address are bound to this identity.
    pub email: String,
    /// Key records as fetched from the server.
    pub records: Vec<KeyRecord>,
    /// Latest attested signed key list, if one was ever published.
    pub skl: Option<SignedKeyList>,
}

/// Something that owns a key set: the user globally, or one address.
///
/// The bare-user key set carries no signed key list; address key sets always
/// attest their active keys.
#[derive(Debug, Clone)]
pub enum KeyOwner {
    /// The user's global key set.
    User {
        /// Owner id of the user.
        id: OwnerId,
        /// Key records as fetched from the server.
        records: Vec<KeyRecord>,
    },
    /// One address key set.
    Address(Address),
}

impl KeyOwner {
    /// Owner id.
    pub fn id(&self) -> &OwnerId {
        match self {
            Self::User { id, .. } => id,
            Self::Address(address) => &address.id,
        }
    }

    /// Key records as fetched from the server.
    pub fn records(&self) -> &[KeyRecord] {
        match self {
            Self::User { records, .. } => records,
            Self::Address(address) => &address.records,
        }
    }

    /// The attested signed key list, if this owner type carries one.
    pub fn attested_skl(&self) -> Option<&SignedKeyList> {
        match self {
            Self::User { .. } => None,
            Self::Address(address) => address.skl.as_ref(),
        }
    }

    /// Identity new or reformatted keys for this owner are bound to.
    ///
    /// `None` for the user key set: user keys keep whatever identity they
    /// were generated with.
    pub fn identity(&self) -> Option<KeyIdentity> {
        match self {
            Self::User { .. } => None,
            Self::Address(address) => Some(KeyIdentity::from_email(address.email.clone())),
        }
    }

    /// Whether this owner publishes a signed key list.
    pub fn signs_key_list(&self) -> bool {
        matches!(self, Self::Address(_))
    }
}

/// An organization-wide key pair used to co-wrap and co-sign the wrap tokens
/// of managed (non-private) members.
#[derive(Debug, Clone)]
pub struct OrganizationKey<K> {
    /// Opaque decrypted key pair handle.
    pub key_pair: K,
    /// Public fingerprint of the organization key.
    pub fingerprint: Fingerprint,
}
