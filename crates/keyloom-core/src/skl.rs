//! Signed key lists: the canonical attestation of an owner's active keys.
//!
//! The document is a JSON array with one object per active key, in the
//! sequence's existing order (never re-sorted), each carrying exactly the
//! public metadata: primary marker, flags, fingerprint, and SHA-256
//! fingerprints. No key material. The document is signed with the sequence's
//! primary key and is immutable once published; a successor supersedes it
//! with a strictly increasing revision.

use keyloom_codec::{Fingerprint, KeyCodec, Signature};
use serde::{Deserialize, Serialize};

use crate::{active::ActiveKey, error::KeyError};

/// One entry of the attested key list document.
///
/// Field names follow the server wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyListItem {
    /// 1 when the key is the owner's primary, 0 otherwise.
    #[serde(rename = "Primary")]
    pub primary: u8,

    /// Capability flags as the wire integer.
    #[serde(rename = "Flags")]
    pub flags: u8,

    /// Public fingerprint of the key.
    #[serde(rename = "Fingerprint")]
    pub fingerprint: Fingerprint,

    /// SHA-256 fingerprints of the key and its subkeys.
    #[serde(rename = "SHA256Fingerprints")]
    pub sha256_fingerprints: Vec<String>,
}

/// A signed, ordered attestation of an owner's active keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedKeyList {
    /// Canonical JSON document listing the active keys.
    #[serde(rename = "Data")]
    pub data: String,

    /// Detached signature over `data` by the listed primary key.
    #[serde(rename = "Signature")]
    pub signature: Signature,

    /// Server-assigned revision; `None` until the server accepted the list.
    #[serde(rename = "Revision", skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

impl SignedKeyList {
    /// Parse this list's document into its entries.
    pub fn items(&self) -> Result<Vec<KeyListItem>, KeyError> {
        parse_data(&self.data)
    }
}

/// Parse a signed-key-list document.
///
/// Rejects anything but a JSON array of well-formed entries.
pub fn parse_data(data: &str) -> Result<Vec<KeyListItem>, KeyError> {
    serde_json::from_str(data).map_err(|err| KeyError::MalformedKeyList { reason: err.to_string() })
}

/// Serialize an active key sequence into the canonical document.
///
/// Order is preserved exactly; the primary key is not moved to the front.
pub fn serialize_items<K>(active_keys: &[ActiveKey<K>]) -> Result<String, KeyError> {
    let items: Vec<KeyListItem> = active_keys.iter().map(ActiveKey::to_list_item).collect();
    serde_json::to_string(&items)
        .map_err(|err| KeyError::MalformedKeyList { reason: err.to_string() })
}

/// Build a signed key list from an active key sequence.
///
/// Fails with [`KeyError::MissingPrimaryKey`] when the sequence is empty
/// (there is nothing to sign with) or when no entry is marked primary. The
/// returned list has no revision; the server assigns one on acceptance.
pub async fn build<C: KeyCodec>(
    codec: &C,
    active_keys: &[ActiveKey<C::KeyPair>],
) -> Result<SignedKeyList, KeyError> {
    let primary = active_keys
        .iter()
        .find(|key| key.primary)
        .ok_or(KeyError::MissingPrimaryKey)?;

    let data = serialize_items(active_keys)?;
    let signature = codec.sign_detached(data.as_bytes(), &primary.key_pair).await?;

    Ok(SignedKeyList { data, signature, revision: None })
}

/// Verify a signed key list against the key pair that claims to have signed
/// it.
///
/// Returns [`KeyError::SignatureVerificationFailed`] on a well-formed but
/// invalid signature.
pub async fn verify<C: KeyCodec>(
    codec: &C,
    skl: &SignedKeyList,
    signing_key: &C::KeyPair,
) -> Result<(), KeyError> {
    let valid = codec.verify_detached(skl.data.as_bytes(), &skl.signature, signing_key).await?;
    if valid { Ok(()) } else { Err(KeyError::SignatureVerificationFailed) }
}
