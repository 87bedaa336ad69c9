//! Reconciliation of decrypted keys against the attested key list.
//!
//! [`resolve`] is the single entry point that turns raw server records plus
//! whatever the current credentials managed to decrypt into the owner's
//! active key sequence and the complementary inactive set. It is pure and
//! synchronous: fingerprint reads are the only codec calls involved, and the
//! same inputs always produce the same outputs, so running it under two
//! credential contexts side by side (as inferred reactivation does) is safe.

use std::collections::{HashMap, HashSet};

use keyloom_codec::{Fingerprint, KeyCodec};

use crate::{
    error::KeyError,
    flags::KeyFlags,
    record::{DecryptedKey, KeyRecord},
    skl::{KeyListItem, SignedKeyList},
};

/// A key currently trusted and usable for an owner.
///
/// Order within the active sequence is significant: it is the canonical
/// order embedded in the signed key list and stays stable across rebuilds
/// unless a key is intentionally added, removed, or reordered.
#[derive(Debug, Clone)]
pub struct ActiveKey<K> {
    /// Id of the backing server record.
    pub id: crate::record::KeyId,
    /// Opaque decrypted key pair handle.
    pub key_pair: K,
    /// Public fingerprint.
    pub fingerprint: Fingerprint,
    /// SHA-256 fingerprints of the key and its subkeys.
    pub sha256_fingerprints: Vec<String>,
    /// Capability flags.
    pub flags: KeyFlags,
    /// Whether this is the owner's primary key. At most one per owner.
    pub primary: bool,
}

impl<K> ActiveKey<K> {
    /// Public metadata entry for the signed key list document.
    pub fn to_list_item(&self) -> KeyListItem {
        KeyListItem {
            primary: u8::from(self.primary),
            flags: self.flags.bits(),
            fingerprint: self.fingerprint.clone(),
            sha256_fingerprints: self.sha256_fingerprints.clone(),
        }
    }
}

/// A server record whose private half did not decrypt under the current
/// credentials.
///
/// The public fingerprint is kept when the record's public portion is
/// readable, so the key can still be correlated during reactivation.
#[derive(Debug, Clone)]
pub struct InactiveKey {
    /// Id of the server record.
    pub id: crate::record::KeyId,
    /// The record itself, untouched.
    pub record: KeyRecord,
    /// Fingerprint recovered from the public portion, when obtainable.
    pub fingerprint: Option<Fingerprint>,
}

/// Reconcile decrypted keys with the server-attested key list.
///
/// Decrypted keys found in the attestation inherit its primary marker and
/// flags; unattested keys get `default_flags` and are primary only when they
/// are the very first key of an otherwise empty owner. Records with no
/// decrypted counterpart come back as [`InactiveKey`]s.
///
/// The output is normalized so that a non-empty active sequence carries
/// exactly one primary entry, preserving order.
///
/// # Errors
///
/// - [`KeyError::DuplicateKey`] when two inputs share a fingerprint; no
///   partial output is produced.
/// - [`KeyError::MalformedKeyList`] when the attested document does not
///   parse.
pub fn resolve<C: KeyCodec>(
    codec: &C,
    attested_skl: Option<&SignedKeyList>,
    records: &[KeyRecord],
    decrypted_keys: &[DecryptedKey<C::KeyPair>],
    default_flags: KeyFlags,
) -> Result<(Vec<ActiveKey<C::KeyPair>>, Vec<InactiveKey>), KeyError> {
    let attested = index_attested(attested_skl)?;

    // Fail on duplicate fingerprints before producing anything.
    let mut seen = HashSet::new();
    for fingerprint in records.iter().filter_map(|r| codec.public_fingerprint(&r.wrapped_private_key))
    {
        if !seen.insert(fingerprint.clone()) {
            return Err(KeyError::DuplicateKey { fingerprint });
        }
    }
    let mut seen = HashSet::new();
    let fingerprints: Vec<Fingerprint> =
        decrypted_keys.iter().map(|key| codec.fingerprint(&key.key_pair)).collect();
    for fingerprint in &fingerprints {
        if !seen.insert(fingerprint.clone()) {
            return Err(KeyError::DuplicateKey { fingerprint: fingerprint.clone() });
        }
    }

    // With nothing decrypted there is no active/inactive distinction to make.
    if decrypted_keys.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut active_keys = Vec::with_capacity(decrypted_keys.len());
    for (key, fingerprint) in decrypted_keys.iter().zip(fingerprints) {
        let (primary, flags) = match attested.get(&fingerprint) {
            Some(item) => (item.primary == 1, KeyFlags::from_bits(item.flags)),
            // First key of an empty owner becomes primary; any later
            // unattested key starts out non-primary.
            None => (attested.is_empty() && active_keys.is_empty(), default_flags),
        };

        active_keys.push(ActiveKey {
            id: key.id.clone(),
            key_pair: key.key_pair.clone(),
            sha256_fingerprints: codec.sha256_fingerprints(&key.key_pair),
            fingerprint,
            flags,
            primary,
        });
    }

    normalize_primary(&mut active_keys);

    let decrypted_ids: HashSet<_> = decrypted_keys.iter().map(|key| &key.id).collect();
    let inactive_keys = records
        .iter()
        .filter(|record| !decrypted_ids.contains(&record.id))
        .map(|record| InactiveKey {
            id: record.id.clone(),
            fingerprint: codec.public_fingerprint(&record.wrapped_private_key),
            record: record.clone(),
        })
        .collect();

    Ok((active_keys, inactive_keys))
}

/// Force the exactly-one-primary invariant on a non-empty sequence.
///
/// The attestation may mark a key primary that no longer decrypts, or (after
/// a server-side repair) more than one; order is preserved, the first primary
/// wins, and with none present the first key is promoted.
pub fn normalize_primary<K>(active_keys: &mut [ActiveKey<K>]) {
    let mut primary_seen = false;
    for key in active_keys.iter_mut() {
        if key.primary {
            if primary_seen {
                key.primary = false;
            }
            primary_seen = true;
        }
    }
    if !primary_seen
        && let Some(first) = active_keys.first_mut()
    {
        first.primary = true;
    }
}

fn index_attested(
    attested_skl: Option<&SignedKeyList>,
) -> Result<HashMap<Fingerprint, KeyListItem>, KeyError> {
    let Some(skl) = attested_skl else {
        return Ok(HashMap::new());
    };
    let items = skl.items()?;
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        if map.insert(item.fingerprint.clone(), item).is_some() {
            // An attestation listing one fingerprint twice is as much a
            // caller error as duplicate records.
            return Err(KeyError::MalformedKeyList {
                reason: "attested list contains a duplicate fingerprint".to_owned(),
            });
        }
    }
    Ok(map)
}
