//! Builders for key records and owners.
//!
//! Records must carry genuinely wrapped bytes (the resolver reads public
//! fingerprints off them), so the builders go through [`MockCodec`] and are
//! async like the codec itself.

use keyloom_codec::{KeyCodec, SecretToken};
use keyloom_core::{
    Address, KeyFlags, KeyOwner, KeyRecord, KeyWrapping, OwnerId, SignedKeyList,
};

use crate::mock_codec::{MockCodec, MockKeyPair};

/// A pre-migration record: wrapped directly under `secret`.
///
/// # Panics
///
/// Panics when the mock codec fails, which it only does on a malformed
/// envelope it produced itself.
#[allow(clippy::unwrap_used)]
pub async fn legacy_record(
    codec: &MockCodec,
    id: &str,
    pair: &MockKeyPair,
    secret: &str,
    primary: bool,
) -> KeyRecord {
    let wrapped_private_key = codec.wrap(pair, secret).await.unwrap();
    KeyRecord {
        id: id.into(),
        wrapped_private_key,
        wrapping: KeyWrapping::Legacy,
        flags: KeyFlags::baseline(),
        primary,
        version: 3,
    }
}

/// A v2 record: wrapped under `token`, which is encrypted to `user_key` (and
/// `org_key` when given) and signed by each.
///
/// # Panics
///
/// Panics when the mock codec fails, which it only does on a malformed
/// envelope it produced itself.
#[allow(clippy::unwrap_used)]
pub async fn v2_record(
    codec: &MockCodec,
    id: &str,
    pair: &MockKeyPair,
    user_key: &MockKeyPair,
    org_key: Option<&MockKeyPair>,
    token: &str,
    primary: bool,
) -> KeyRecord {
    let secret = SecretToken::new(token);
    let mut recipients = vec![user_key.clone()];
    if let Some(org) = org_key {
        recipients.push(org.clone());
    }

    let encrypted = codec.encrypt_token(&secret, &recipients).await.unwrap();
    let signature = codec.sign_detached(token.as_bytes(), user_key).await.unwrap();
    let org_signature = match org_key {
        Some(org) => Some(codec.sign_detached(token.as_bytes(), org).await.unwrap()),
        None => None,
    };
    KeyRecord {
        id: id.into(),
        wrapped_private_key: codec.wrap(pair, token).await.unwrap(),
        wrapping: KeyWrapping::V2 { token: encrypted, signature, org_signature },
        flags: KeyFlags::baseline(),
        primary,
        version: 3,
    }
}

/// A user key set owner.
pub fn user_owner(id: &str, records: Vec<KeyRecord>) -> KeyOwner {
    KeyOwner::User { id: OwnerId::new(id), records }
}

/// An address key set owner.
pub fn address_owner(
    id: &str,
    email: &str,
    records: Vec<KeyRecord>,
    skl: Option<SignedKeyList>,
) -> KeyOwner {
    KeyOwner::Address(Address {
        id: OwnerId::new(id),
        email: email.to_owned(),
        records,
        skl,
    })
}
