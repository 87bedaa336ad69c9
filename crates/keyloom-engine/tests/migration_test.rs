//! Legacy-to-v2 migration scenarios.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use keyloom_codec::{KeyCodec, SecretToken};
use keyloom_core::{Address, DecryptedKey, KeyActionLog, KeyError, KeyTransparency, OwnerId, skl};
use keyloom_engine::{
    AuthScope, KeyMigrationEngine, ScopeSet, TokenSource,
    migrate::ManagedMember,
};
use keyloom_harness::{
    MockCodec, MockKeyPair, MockTransparency, MockTransport, TransparencyEvent, TransportCall,
    address_owner, legacy_record, v2_record,
};

const MEMBER_SECRET: &str = "member-passphrase";

fn engine(
    codec: &MockCodec,
    transport: &Arc<MockTransport>,
    transparency: &Arc<MockTransparency>,
) -> KeyMigrationEngine<MockCodec, Arc<MockTransport>> {
    let transparency: Arc<dyn KeyTransparency> = Arc::<MockTransparency>::clone(transparency);
    KeyMigrationEngine::new(codec.clone(), Arc::clone(transport))
        .with_transparency(transparency)
        .with_tokens(TokenSource::seeded(9))
}

fn decrypted(records: &[(&str, &MockKeyPair)]) -> Vec<DecryptedKey<MockKeyPair>> {
    records
        .iter()
        .map(|(id, pair)| DecryptedKey { id: (*id).into(), key_pair: (*pair).clone() })
        .collect()
}

#[tokio::test]
async fn legacy_address_migrates_every_key_and_rebuilds_the_list() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let user_key = MockKeyPair::tagged(10, "user@test");
    let a = MockKeyPair::tagged(1, "addr@test");
    let b = MockKeyPair::tagged(2, "addr@test");
    let c = MockKeyPair::tagged(3, "addr@test");

    let owner = address_owner(
        "addr-1",
        "addr@test",
        vec![
            legacy_record(&codec, "key-a", &a, MEMBER_SECRET, true).await,
            legacy_record(&codec, "key-b", &b, MEMBER_SECRET, false).await,
            legacy_record(&codec, "key-c", &c, MEMBER_SECRET, false).await,
        ],
        None,
    );
    let decrypted_keys = decrypted(&[("key-a", &a), ("key-b", &b), ("key-c", &c)]);

    let mut log = KeyActionLog::new();
    let payload = engine
        .migrate_owner(&owner, &decrypted_keys, &user_key, None, &mut log)
        .await
        .unwrap();

    assert_eq!(payload.per_key.len(), 3);
    assert_eq!(log.ok_ids().len(), 3);
    for migrated in &payload.per_key {
        // Each key's token opens with the user key and carries its signature.
        let token = codec.decrypt_token(&migrated.wrap_token, &user_key).await.unwrap();
        assert!(
            codec
                .verify_detached(token.expose().as_bytes(), &migrated.wrap_signature, &user_key)
                .await
                .unwrap()
        );
        assert!(migrated.org_signature.is_none());
        // The re-wrapped private key opens under the token.
        codec.unwrap(&migrated.wrapped_private_key, token.expose()).await.unwrap();
    }

    // Fresh attestation: first key primary, signed by it, all three listed.
    let new_skl = payload.new_skl.unwrap();
    skl::verify(&codec, &new_skl, &a).await.unwrap();
    let items = new_skl.items().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].primary, 1);
    assert_eq!(items[0].fingerprint, a.fingerprint());
}

#[tokio::test]
async fn fully_migrated_owner_is_a_noop() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let user_key = MockKeyPair::tagged(10, "user@test");
    let a = MockKeyPair::tagged(1, "addr@test");
    let owner = address_owner(
        "addr-1",
        "addr@test",
        vec![v2_record(&codec, "key-a", &a, &user_key, None, "cafef00d", true).await],
        None,
    );

    let mut log = KeyActionLog::new();
    let payload = engine
        .migrate_owner(&owner, &decrypted(&[("key-a", &a)]), &user_key, None, &mut log)
        .await
        .unwrap();

    assert!(payload.is_noop());
    assert!(log.is_empty());
}

#[tokio::test]
async fn missing_key_material_aborts_the_owner() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let user_key = MockKeyPair::tagged(10, "user@test");
    let a = MockKeyPair::tagged(1, "addr@test");
    let b = MockKeyPair::tagged(2, "addr@test");
    let owner = address_owner(
        "addr-1",
        "addr@test",
        vec![
            legacy_record(&codec, "key-a", &a, MEMBER_SECRET, true).await,
            legacy_record(&codec, "key-b", &b, MEMBER_SECRET, false).await,
        ],
        None,
    );

    // Only one of the two keys decrypted.
    let mut log = KeyActionLog::new();
    let result = engine
        .migrate_owner(&owner, &decrypted(&[("key-a", &a)]), &user_key, None, &mut log)
        .await;

    assert!(matches!(result, Err(KeyError::MissingKeyMaterial { ref id }) if id.as_str() == "key-b"));
    assert!(matches!(log.outcome(&"key-b".into()), Some(Err(_))));
}

async fn build_member(
    codec: &MockCodec,
    org_key: &MockKeyPair,
    member_id: &str,
    user_tag: u8,
    address_tags: &[u8],
) -> (ManagedMember, MockKeyPair) {
    let user_key = MockKeyPair::tagged(user_tag, "member@test");
    let user_record = legacy_record(codec, "member-user-key", &user_key, MEMBER_SECRET, true).await;
    let user_token = codec
        .encrypt_token(&SecretToken::new(MEMBER_SECRET), &[org_key.clone()])
        .await
        .unwrap();

    let mut records = Vec::new();
    for (index, tag) in address_tags.iter().enumerate() {
        let pair = MockKeyPair::tagged(*tag, "member@test");
        records.push(
            legacy_record(codec, &format!("addr-key-{index}"), &pair, MEMBER_SECRET, index == 0)
                .await,
        );
    }
    let address = Address {
        id: OwnerId::new(format!("{member_id}-addr")),
        email: "member@test".to_owned(),
        records,
        skl: None,
    };

    let member = ManagedMember {
        id: OwnerId::new(member_id),
        user_record,
        user_token,
        addresses: vec![address],
    };
    (member, user_key)
}

#[tokio::test]
async fn organization_migration_submits_one_update_per_member() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let org_key = MockKeyPair::tagged(100, "org@test");
    let wrapped_org = codec.wrap(&org_key, "org-pass").await.unwrap();
    transport.set_organization_key(keyloom_engine::WrappedOrganizationKey {
        wrapped_private_key: wrapped_org,
    });

    let (member, _) = build_member(&codec, &org_key, "member-1", 10, &[1, 2]).await;
    transport.set_members(vec![member]);

    let scopes = ScopeSet::from_scopes([AuthScope::Password]);
    let report = engine.migrate_organization(&scopes, "org-pass").await.unwrap();

    assert_eq!(report.migrated_members, vec![OwnerId::new("member-1")]);
    assert!(report.failed_members.is_empty());
    assert_eq!(report.log.ok_ids().len(), 2);

    let upgrades: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::UpgradeMemberKeys { member_id, updates } => Some((member_id, updates)),
            _ => None,
        })
        .collect();
    assert_eq!(upgrades.len(), 1, "one submission per member");
    let (member_id, updates) = &upgrades[0];
    assert_eq!(member_id.as_str(), "member-1");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.per_key.len(), 2);
    assert!(updates[0].1.new_skl.is_some());

    // The pending key list was confirmed, not discarded.
    assert!(transparency.unresolved().is_empty());
    assert!(matches!(transparency.events().last(), Some(TransparencyEvent::Confirmed(_))));
}

#[tokio::test]
async fn organization_migration_requires_the_password_scope() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let result = engine.migrate_organization(&ScopeSet::new(), "org-pass").await;

    assert!(matches!(result, Err(KeyError::InsufficientScope { .. })));
    assert_eq!(transport.call_count(), 0, "no server traffic before the scope check");
}

#[tokio::test]
async fn undecryptable_organization_key_aborts_before_any_member() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let org_key = MockKeyPair::tagged(100, "org@test");
    let wrapped_org = codec.wrap(&org_key, "org-pass").await.unwrap();
    transport.set_organization_key(keyloom_engine::WrappedOrganizationKey {
        wrapped_private_key: wrapped_org,
    });

    let scopes = ScopeSet::from_scopes([AuthScope::Password]);
    let result = engine.migrate_organization(&scopes, "wrong-pass").await;

    assert!(matches!(result, Err(KeyError::UndecryptableOrganizationKey)));
    assert_eq!(transport.call_count(), 1, "only the organization key fetch happened");
}

#[tokio::test]
async fn failing_member_is_reported_without_stopping_the_others() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let org_key = MockKeyPair::tagged(100, "org@test");
    let wrapped_org = codec.wrap(&org_key, "org-pass").await.unwrap();
    transport.set_organization_key(keyloom_engine::WrappedOrganizationKey {
        wrapped_private_key: wrapped_org,
    });

    let (good, _) = build_member(&codec, &org_key, "member-good", 10, &[1, 2]).await;
    let (bad, _) = build_member(&codec, &org_key, "member-bad", 20, &[3]).await;
    transport.set_members(vec![good, bad]);
    transport.fail_upgrade(OwnerId::new("member-bad"));

    let scopes = ScopeSet::from_scopes([AuthScope::Password]);
    let report = engine.migrate_organization(&scopes, "org-pass").await.unwrap();

    assert_eq!(report.migrated_members, vec![OwnerId::new("member-good")]);
    assert_eq!(report.failed_members.len(), 1);
    assert_eq!(report.failed_members[0].0, OwnerId::new("member-bad"));
    assert!(matches!(report.failed_members[0].1, KeyError::Transport(_)));

    // The failed member's pending list was discarded; nothing dangles.
    assert!(transparency.unresolved().is_empty());
    assert!(
        transparency
            .events()
            .iter()
            .any(|event| matches!(event, TransparencyEvent::Discarded(_)))
    );
}

#[tokio::test]
async fn duplicate_member_keys_fail_the_member_with_no_submission() {
    let codec = MockCodec::seeded(1);
    let transport = Arc::new(MockTransport::new());
    let transparency = Arc::new(MockTransparency::new());
    let engine = engine(&codec, &transport, &transparency);

    let org_key = MockKeyPair::tagged(100, "org@test");
    let wrapped_org = codec.wrap(&org_key, "org-pass").await.unwrap();
    transport.set_organization_key(keyloom_engine::WrappedOrganizationKey {
        wrapped_private_key: wrapped_org,
    });

    // Same key material behind two address records.
    let (member, _) = build_member(&codec, &org_key, "member-1", 10, &[1, 1]).await;
    transport.set_members(vec![member]);

    let scopes = ScopeSet::from_scopes([AuthScope::Password]);
    let report = engine.migrate_organization(&scopes, "org-pass").await.unwrap();

    assert!(report.migrated_members.is_empty());
    assert_eq!(report.failed_members.len(), 1);
    assert!(matches!(report.failed_members[0].1, KeyError::DuplicateKey { .. }));
    assert!(
        !transport
            .calls()
            .iter()
            .any(|call| matches!(call, TransportCall::UpgradeMemberKeys { .. })),
        "a failed member must not be partially submitted"
    );
}
