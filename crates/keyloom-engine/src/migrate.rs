//! Migration from legacy passphrase wrapping to v2 token wrapping.
//!
//! Per owner, every private key is re-wrapped under a fresh random token
//! that is signed by the primary user key (and co-signed by the organization
//! key for managed members) and encrypted to the same keys. The owner's new
//! active sequence is attested by a freshly signed key list.
//!
//! The organization-wide run is strict about ordering: authorization scope
//! first, then the organization key (aborting everything if it does not
//! decrypt), then one migration per managed member. A member that fails is
//! reported and skipped; members already migrated are no-ops.

use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream};
use keyloom_codec::{EncryptedToken, KeyCodec, Signature};
use keyloom_core::{
    DecryptedKey, KeyActionLog, KeyError, KeyFlags, KeyId, KeyOwner, KeyRecord, KeyTransparency,
    KeyWrapping, OrganizationKey, OwnerId, PendingPublication, SignedKeyList,
    owner::Address,
    resolve, skl,
};
use tracing::{debug, warn};

use crate::{
    config::EngineConfig,
    scope::{AuthScope, ScopeSet},
    token::TokenSource,
    transport::KeyTransport,
    wrap::token_wrap_key,
};

/// One re-wrapped key of a migration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedKey {
    /// Record being migrated.
    pub id: KeyId,
    /// Private key re-wrapped under the new token.
    pub wrapped_private_key: Bytes,
    /// The token, encrypted to the user (and organization) key.
    pub wrap_token: EncryptedToken,
    /// User-key signature over the plaintext token.
    pub wrap_signature: Signature,
    /// Independent organization co-signature, for managed members.
    pub org_signature: Option<Signature>,
}

/// Everything the server needs to move one owner to v2 format.
#[derive(Debug, Clone, Default)]
pub struct MigrationPayload {
    /// Re-wrapped keys, one entry per record.
    pub per_key: Vec<MigratedKey>,
    /// New signed key list, for owners that attest their keys.
    pub new_skl: Option<SignedKeyList>,
}

impl MigrationPayload {
    /// Whether the owner was already fully migrated and nothing changes.
    pub fn is_noop(&self) -> bool {
        self.per_key.is_empty()
    }
}

/// A managed (non-private) member as enumerated for organization migration.
///
/// The member's key passphrase travels encrypted to the organization key, so
/// an admin can open the member's keys without knowing their password.
#[derive(Debug, Clone)]
pub struct ManagedMember {
    /// Member id.
    pub id: OwnerId,
    /// The member's primary user key record.
    pub user_record: KeyRecord,
    /// Member key passphrase, encrypted to the organization key.
    pub user_token: EncryptedToken,
    /// The member's addresses with their key records.
    pub addresses: Vec<Address>,
}

/// Outcome of an organization-wide migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Members whose migration was submitted (or was already complete).
    pub migrated_members: Vec<OwnerId>,
    /// Members that failed, with the error that stopped them. Failures do
    /// not abort sibling members.
    pub failed_members: Vec<(OwnerId, KeyError)>,
    /// Per-key outcomes across all members.
    pub log: KeyActionLog,
}

/// Engine that moves key sets from legacy to v2 wrapping.
pub struct KeyMigrationEngine<C, T> {
    codec: C,
    transport: T,
    transparency: Option<Arc<dyn KeyTransparency>>,
    config: EngineConfig,
    tokens: TokenSource,
}

impl<C: KeyCodec, T: KeyTransport> KeyMigrationEngine<C, T> {
    /// Engine with default configuration and no transparency collaborator.
    pub fn new(codec: C, transport: T) -> Self {
        Self {
            codec,
            transport,
            transparency: None,
            config: EngineConfig::default(),
            tokens: TokenSource::new(),
        }
    }

    /// Attach a key-transparency collaborator.
    pub fn with_transparency(mut self, transparency: Arc<dyn KeyTransparency>) -> Self {
        self.transparency = Some(transparency);
        self
    }

    /// Override the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the wrap-token source (seeded in tests).
    pub fn with_tokens(mut self, tokens: TokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    fn transparency_ref(&self) -> Option<&dyn KeyTransparency> {
        self.transparency.as_deref()
    }

    /// Build the migration payload for one owner.
    ///
    /// All-or-nothing per owner: the first key that cannot be processed gets
    /// its error recorded in `log` and aborts this owner (a partial payload
    /// would drop sibling keys from the attested list). An owner whose
    /// records are already all v2 short-circuits to a no-op payload before
    /// any cryptography.
    ///
    /// Successfully built keys are recorded as `ok`; the caller submits the
    /// payload as one server update.
    pub async fn migrate_owner(
        &self,
        owner: &KeyOwner,
        decrypted_keys: &[DecryptedKey<C::KeyPair>],
        primary_user_key: &C::KeyPair,
        organization_key: Option<&OrganizationKey<C::KeyPair>>,
        log: &mut KeyActionLog,
    ) -> Result<MigrationPayload, KeyError> {
        let records = owner.records();
        if records.is_empty() || records.iter().all(KeyRecord::is_migrated) {
            debug!(owner = %owner.id(), "owner already migrated, nothing to do");
            return Ok(MigrationPayload::default());
        }

        let mut per_key = Vec::with_capacity(records.len());
        for record in records {
            let Some(decrypted) = decrypted_keys.iter().find(|key| key.id == record.id) else {
                let error = KeyError::MissingKeyMaterial { id: record.id.clone() };
                log.record_err(record.id.clone(), error.clone());
                return Err(error);
            };

            let wrap = match token_wrap_key(
                &self.codec,
                &self.tokens,
                &decrypted.key_pair,
                primary_user_key,
                organization_key,
            )
            .await
            {
                Ok(wrap) => wrap,
                Err(error) => {
                    log.record_err(record.id.clone(), error.clone());
                    return Err(error);
                },
            };

            per_key.push(MigratedKey {
                id: record.id.clone(),
                wrapped_private_key: wrap.wrapped_private_key,
                wrap_token: wrap.token,
                wrap_signature: wrap.signature,
                org_signature: wrap.org_signature,
            });
        }

        // Active sequence rebuilt from scratch: migration re-attests the keys
        // without consulting the previous list, so the first key becomes
        // primary per the empty-owner rule.
        let (active_keys, _inactive) =
            resolve(&self.codec, None, records, decrypted_keys, KeyFlags::baseline())?;

        let new_skl = if owner.signs_key_list() {
            Some(skl::build(&self.codec, &active_keys).await?)
        } else {
            None
        };

        for key in &per_key {
            log.record_ok(key.id.clone());
        }

        Ok(MigrationPayload { per_key, new_skl })
    }

    /// Migrate every managed member of the organization.
    ///
    /// Strict sequence: the session must hold the password scope, and the
    /// organization key must decrypt under `admin_org_passphrase`; either
    /// failure aborts the whole run with no writes. Member migrations then
    /// run with bounded concurrency; a failing member is reported and does
    /// not abort the others.
    pub async fn migrate_organization(
        &self,
        scopes: &ScopeSet,
        admin_org_passphrase: &str,
    ) -> Result<MigrationReport, KeyError> {
        if !scopes.holds(AuthScope::Password) {
            return Err(KeyError::InsufficientScope {
                scope: AuthScope::Password.name().to_owned(),
            });
        }

        let wrapped_org = self.transport.fetch_organization_key().await?;
        let org_pair = self
            .codec
            .unwrap(&wrapped_org.wrapped_private_key, admin_org_passphrase)
            .await
            .map_err(|_| KeyError::UndecryptableOrganizationKey)?;
        let organization_key = OrganizationKey {
            fingerprint: self.codec.fingerprint(&org_pair),
            key_pair: org_pair,
        };

        let members = self.transport.list_members_pending_migration().await?;
        debug!(members = members.len(), "starting organization key migration");

        let mut report = MigrationReport::default();
        let outcomes: Vec<(OwnerId, Result<KeyActionLog, KeyError>)> = stream::iter(members)
            .map(|member| {
                let org = &organization_key;
                async move {
                    let id = member.id.clone();
                    (id, self.migrate_member(org, member).await)
                }
            })
            .buffer_unordered(self.config.effective_concurrency())
            .collect()
            .await;

        for (member_id, outcome) in outcomes {
            match outcome {
                Ok(member_log) => {
                    for (id, result) in member_log.entries() {
                        match result {
                            Ok(()) => report.log.record_ok(id.clone()),
                            Err(error) => report.log.record_err(id.clone(), error.clone()),
                        }
                    }
                    report.migrated_members.push(member_id);
                },
                Err(error) => {
                    warn!(member = %member_id, %error, "member migration failed");
                    report.failed_members.push((member_id, error));
                },
            }
        }

        Ok(report)
    }

    /// Migrate one managed member: open their keys via the organization key,
    /// build all address payloads, then submit them as one member update.
    ///
    /// No submission happens unless every address of the member built
    /// cleanly, so a member is never left half-migrated.
    async fn migrate_member(
        &self,
        organization_key: &OrganizationKey<C::KeyPair>,
        member: ManagedMember,
    ) -> Result<KeyActionLog, KeyError> {
        let member_secret =
            self.codec.decrypt_token(&member.user_token, &organization_key.key_pair).await?;
        let member_user_key = self
            .codec
            .unwrap(&member.user_record.wrapped_private_key, member_secret.expose())
            .await
            .map_err(|_| KeyError::MissingKeyMaterial { id: member.user_record.id.clone() })?;

        let mut log = KeyActionLog::new();
        let mut updates = Vec::new();
        for address in &member.addresses {
            if address.records.is_empty() || address.records.iter().all(KeyRecord::is_migrated) {
                continue;
            }
            let owner = KeyOwner::Address(address.clone());

            let decrypted = self
                .decrypt_member_records(&address.records, &member_user_key, &member_secret)
                .await?;
            let payload = self
                .migrate_owner(
                    &owner,
                    &decrypted,
                    &member_user_key,
                    Some(organization_key),
                    &mut log,
                )
                .await?;
            if !payload.is_noop() {
                updates.push((address.id.clone(), payload));
            }
        }

        if updates.is_empty() {
            return Ok(log);
        }

        // Register every new key list as pending before the single member
        // submission, then settle them all according to its outcome.
        let mut pending = Vec::with_capacity(updates.len());
        for (owner_id, payload) in &updates {
            if let Some(new_skl) = &payload.new_skl {
                pending.push(
                    PendingPublication::register(self.transparency_ref(), owner_id, new_skl)
                        .await?,
                );
            }
        }

        let submit_result =
            self.transport.upgrade_member_keys(&member.id, &updates).await.map_err(KeyError::from);

        match submit_result {
            Ok(()) => {
                // The member update is durable; a transparency hiccup must
                // not report the member as failed.
                for publication in pending {
                    if let Err(confirm_error) = publication.confirm().await {
                        warn!(%confirm_error, "failed to confirm accepted key list");
                    }
                }
                Ok(log)
            },
            Err(error) => {
                for publication in pending {
                    if let Err(discard_error) = publication.discard().await {
                        warn!(%discard_error, "failed to discard pending key list");
                    }
                }
                Err(error)
            },
        }
    }

    /// Decrypt a member's address records using the member user key (v2
    /// records) or the member passphrase (legacy records).
    async fn decrypt_member_records(
        &self,
        records: &[KeyRecord],
        member_user_key: &C::KeyPair,
        member_secret: &keyloom_codec::SecretToken,
    ) -> Result<Vec<DecryptedKey<C::KeyPair>>, KeyError> {
        let mut decrypted = Vec::with_capacity(records.len());
        for record in records {
            let key_pair = match &record.wrapping {
                KeyWrapping::Legacy => {
                    self.codec
                        .unwrap(&record.wrapped_private_key, member_secret.expose())
                        .await
                },
                KeyWrapping::V2 { token, .. } => {
                    let token = self.codec.decrypt_token(token, member_user_key).await?;
                    self.codec.unwrap(&record.wrapped_private_key, token.expose()).await
                },
            }
            .map_err(|_| KeyError::MissingKeyMaterial { id: record.id.clone() })?;
            decrypted.push(DecryptedKey { id: record.id.clone(), key_pair });
        }
        Ok(decrypted)
    }
}
