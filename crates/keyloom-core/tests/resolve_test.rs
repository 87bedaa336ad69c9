//! Active-key reconciliation against records and attested key lists.

#![allow(clippy::unwrap_used)]

use keyloom_core::{DecryptedKey, KeyError, KeyFlags, resolve, skl};
use keyloom_harness::{MockCodec, MockKeyPair, legacy_record};

fn decrypted(id: &str, pair: &MockKeyPair) -> DecryptedKey<MockKeyPair> {
    DecryptedKey { id: id.into(), key_pair: pair.clone() }
}

#[tokio::test]
async fn attested_keys_inherit_primary_and_flags() {
    let codec = MockCodec::seeded(1);
    let a = MockKeyPair::tagged(1, "a@test");
    let b = MockKeyPair::tagged(2, "a@test");

    let records = vec![
        legacy_record(&codec, "key-a", &a, "pw", false).await,
        legacy_record(&codec, "key-b", &b, "pw", true).await,
    ];
    let decrypted_keys = vec![decrypted("key-a", &a), decrypted("key-b", &b)];

    // Attestation says b is primary with encryption disabled on a.
    let attested = skl::build(
        &codec,
        &[
            active_entry(&codec, "key-a", &a, KeyFlags::baseline().without(KeyFlags::NOT_OBSOLETE), false),
            active_entry(&codec, "key-b", &b, KeyFlags::baseline(), true),
        ],
    )
    .await
    .unwrap();

    let (active, inactive) =
        resolve(&codec, Some(&attested), &records, &decrypted_keys, KeyFlags::baseline()).unwrap();

    assert!(inactive.is_empty());
    assert_eq!(active.len(), 2);
    assert!(!active[0].primary);
    assert!(active[1].primary);
    assert!(!active[0].flags.contains(KeyFlags::NOT_OBSOLETE));
    assert!(active[1].flags.contains(KeyFlags::NOT_OBSOLETE));
}

#[tokio::test]
async fn first_decrypted_key_promoted_when_attested_primary_is_missing() {
    let codec = MockCodec::seeded(1);
    let lost = MockKeyPair::tagged(1, "a@test");
    let kept = MockKeyPair::tagged(2, "a@test");

    let records = vec![
        legacy_record(&codec, "key-lost", &lost, "old-pw", true).await,
        legacy_record(&codec, "key-kept", &kept, "pw", false).await,
    ];
    // Only the non-primary key decrypted.
    let decrypted_keys = vec![decrypted("key-kept", &kept)];

    let attested = skl::build(
        &codec,
        &[
            active_entry(&codec, "key-lost", &lost, KeyFlags::baseline(), true),
            active_entry(&codec, "key-kept", &kept, KeyFlags::baseline(), false),
        ],
    )
    .await
    .unwrap();

    let (active, inactive) =
        resolve(&codec, Some(&attested), &records, &decrypted_keys, KeyFlags::baseline()).unwrap();

    assert_eq!(active.len(), 1);
    assert!(active[0].primary, "surviving key must be promoted");
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].id.as_str(), "key-lost");
    assert_eq!(inactive[0].fingerprint, Some(lost.fingerprint()));
}

#[tokio::test]
async fn unattested_keys_are_primary_only_on_an_empty_owner() {
    let codec = MockCodec::seeded(1);
    let first = MockKeyPair::tagged(1, "a@test");
    let second = MockKeyPair::tagged(2, "a@test");

    let records = vec![
        legacy_record(&codec, "key-1", &first, "pw", false).await,
        legacy_record(&codec, "key-2", &second, "pw", false).await,
    ];
    let decrypted_keys = vec![decrypted("key-1", &first), decrypted("key-2", &second)];

    let (active, _) = resolve(&codec, None, &records, &decrypted_keys, KeyFlags::baseline()).unwrap();

    assert!(active[0].primary);
    assert!(!active[1].primary);
}

#[tokio::test]
async fn reconciliation_is_idempotent_over_its_own_attestation() {
    let codec = MockCodec::seeded(1);
    let a = MockKeyPair::tagged(1, "a@test");
    let b = MockKeyPair::tagged(2, "a@test");

    let records = vec![
        legacy_record(&codec, "key-a", &a, "pw", true).await,
        legacy_record(&codec, "key-b", &b, "pw", false).await,
    ];
    let decrypted_keys = vec![decrypted("key-a", &a), decrypted("key-b", &b)];

    let (first, _) = resolve(&codec, None, &records, &decrypted_keys, KeyFlags::baseline()).unwrap();
    let attested = skl::build(&codec, &first).await.unwrap();
    let (second, _) =
        resolve(&codec, Some(&attested), &records, &decrypted_keys, KeyFlags::baseline()).unwrap();

    for (before, after) in first.iter().zip(&second) {
        assert_eq!(before.primary, after.primary);
        assert_eq!(before.flags, after.flags);
        assert_eq!(before.fingerprint, after.fingerprint);
    }
}

#[tokio::test]
async fn nothing_decrypted_resolves_to_nothing() {
    let codec = MockCodec::seeded(1);
    let pair = MockKeyPair::tagged(1, "a@test");
    let records = vec![legacy_record(&codec, "key-1", &pair, "pw", true).await];

    let (active, inactive) = resolve(&codec, None, &records, &[], KeyFlags::baseline()).unwrap();

    assert!(active.is_empty());
    assert!(inactive.is_empty());
}

#[tokio::test]
async fn duplicate_record_fingerprints_are_rejected() {
    let codec = MockCodec::seeded(1);
    let pair = MockKeyPair::tagged(1, "a@test");

    // Same key material under two record ids.
    let records = vec![
        legacy_record(&codec, "key-1", &pair, "pw", true).await,
        legacy_record(&codec, "key-2", &pair, "pw", false).await,
    ];
    let decrypted_keys = vec![decrypted("key-1", &pair)];

    let result = resolve(&codec, None, &records, &decrypted_keys, KeyFlags::baseline());
    assert!(matches!(result, Err(KeyError::DuplicateKey { .. })));
}

#[tokio::test]
async fn duplicate_decrypted_fingerprints_are_rejected() {
    let codec = MockCodec::seeded(1);
    let pair = MockKeyPair::tagged(1, "a@test");

    let records = vec![legacy_record(&codec, "key-1", &pair, "pw", true).await];
    let decrypted_keys = vec![decrypted("key-1", &pair), decrypted("key-2", &pair)];

    let result = resolve(&codec, None, &records, &decrypted_keys, KeyFlags::baseline());
    assert!(matches!(result, Err(KeyError::DuplicateKey { .. })));
}

#[tokio::test]
async fn attested_list_with_duplicate_fingerprint_is_malformed() {
    let codec = MockCodec::seeded(1);
    let pair = MockKeyPair::tagged(1, "a@test");

    let attested = skl::build(
        &codec,
        &[
            active_entry(&codec, "key-1", &pair, KeyFlags::baseline(), true),
        ],
    )
    .await
    .unwrap();
    let doubled = keyloom_core::SignedKeyList {
        data: format!(
            "[{item},{item}]",
            item = attested.data.trim_start_matches('[').trim_end_matches(']')
        ),
        signature: attested.signature,
        revision: None,
    };

    let records = vec![legacy_record(&codec, "key-1", &pair, "pw", true).await];
    let decrypted_keys = vec![decrypted("key-1", &pair)];

    let result = resolve(&codec, Some(&doubled), &records, &decrypted_keys, KeyFlags::baseline());
    assert!(matches!(result, Err(KeyError::MalformedKeyList { .. })));
}

fn active_entry(
    codec: &MockCodec,
    id: &str,
    pair: &MockKeyPair,
    flags: KeyFlags,
    primary: bool,
) -> keyloom_core::ActiveKey<MockKeyPair> {
    use keyloom_codec::KeyCodec;
    keyloom_core::ActiveKey {
        id: id.into(),
        key_pair: pair.clone(),
        fingerprint: codec.fingerprint(pair),
        sha256_fingerprints: codec.sha256_fingerprints(pair),
        flags,
        primary,
    }
}
