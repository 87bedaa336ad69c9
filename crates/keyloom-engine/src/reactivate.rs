//! Key reactivation: recovering keys that failed to decrypt.
//!
//! Two modes share one engine. *Direct* reactivation takes a key pair the
//! caller already decrypted (typically an uploaded backup file) and folds it
//! back into the owner's active set, one serialized server call per key.
//! *Inferred* reactivation compares what the resolver decrypts under an old
//! and a new credential context; every key that newly became decryptable is
//! re-wrapped under the new context, and all address key-list rebuilds
//! caused by one user-key change are submitted as a single transaction.
//!
//! Every key id fed in ends up in the action log exactly once, as `ok` or a
//! terminal error; keys that were never candidates are simply absent.

use std::sync::Arc;

use keyloom_codec::KeyCodec;
use keyloom_core::{
    ActiveKey, DecryptedKey, KeyActionLog, KeyError, KeyFlags, KeyId, KeyOwner, KeyRecord,
    KeyTransparency, OrganizationKey, OwnerId, SignedKeyList, normalize_primary, resolve,
};
use tracing::{debug, warn};

use crate::{
    token::TokenSource,
    transport::{AddressReactivation, KeyTransport, UserReactivationBatch, WrappedKeyUpload},
    wrap::token_wrap_key,
};

/// How reactivated keys are re-wrapped for their owner.
///
/// V2 owners get the token flow; owners still on legacy wrapping get a plain
/// passphrase wrap.
pub enum WrapContext<'a, K> {
    /// Token-based wrapping signed by the primary user key.
    Token {
        /// The current primary user key.
        primary_user_key: &'a K,
        /// Organization key for managed members; co-signs the token.
        organization_key: Option<&'a OrganizationKey<K>>,
    },
    /// Legacy passphrase wrapping.
    Passphrase {
        /// The current account key passphrase.
        passphrase: &'a str,
    },
}

/// One key the caller asks to reactivate directly.
pub struct ReactivationCandidate<K> {
    /// Record the uploaded key claims to match.
    pub record: KeyRecord,
    /// The decrypted key pair, when the caller managed to obtain one.
    /// `None` entries are reported as missing key material.
    pub decrypted: Option<K>,
}

/// One owner's decryption results under the old and new credential context,
/// input to inferred reactivation.
pub struct OwnerReactivation<K> {
    /// The owner whose keys are being reconciled.
    pub owner: KeyOwner,
    /// Keys decryptable under the old context.
    pub old_decrypted: Vec<DecryptedKey<K>>,
    /// Keys decryptable under the new context.
    pub new_decrypted: Vec<DecryptedKey<K>>,
}

/// Result of a reactivation run.
#[derive(Debug, Default)]
pub struct ReactivationOutcome {
    /// Per-key outcomes. Keys never attempted are absent.
    pub log: KeyActionLog,
    /// Newly signed key lists per owner, in submission order.
    pub new_skls: Vec<(OwnerId, SignedKeyList)>,
    /// Number of server submissions made.
    pub submissions: usize,
}

/// Engine that recovers previously undecryptable keys.
pub struct KeyReactivationEngine<C, T> {
    codec: C,
    transport: T,
    transparency: Option<Arc<dyn KeyTransparency>>,
    tokens: TokenSource,
}

impl<C: KeyCodec, T: KeyTransport> KeyReactivationEngine<C, T> {
    /// Engine with no transparency collaborator.
    pub fn new(codec: C, transport: T) -> Self {
        Self { codec, transport, transparency: None, tokens: TokenSource::new() }
    }

    /// Attach a key-transparency collaborator.
    pub fn with_transparency(mut self, transparency: Arc<dyn KeyTransparency>) -> Self {
        self.transparency = Some(transparency);
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

    /// Reactivate caller-supplied (uploaded) keys for one owner.
    ///
    /// Keys are processed strictly in sequence: each one is appended to the
    /// active set, the key list is rebuilt and signed, and the server call
    /// must be acknowledged before the next key starts, because every list
    /// embeds the full active set. A failing key is rolled back locally and
    /// recorded; its siblings continue.
    pub async fn reactivate_uploaded(
        &self,
        owner: &KeyOwner,
        current_decrypted: &[DecryptedKey<C::KeyPair>],
        candidates: Vec<ReactivationCandidate<C::KeyPair>>,
        wrap_context: WrapContext<'_, C::KeyPair>,
    ) -> Result<ReactivationOutcome, KeyError> {
        let (mut active_keys, _inactive) = resolve(
            &self.codec,
            owner.attested_skl(),
            owner.records(),
            current_decrypted,
            KeyFlags::baseline(),
        )?;

        let mut outcome = ReactivationOutcome::default();
        for candidate in candidates {
            let id = candidate.record.id.clone();

            let Some(key_pair) = candidate.decrypted else {
                outcome.log.record_err(id.clone(), KeyError::MissingKeyMaterial { id });
                continue;
            };

            // The uploaded key must be the record's key; an unrelated upload
            // has no usable material for this record.
            let fingerprint = self.codec.fingerprint(&key_pair);
            let record_fingerprint =
                self.codec.public_fingerprint(&candidate.record.wrapped_private_key);
            if record_fingerprint.as_ref() != Some(&fingerprint) {
                outcome.log.record_err(id.clone(), KeyError::MissingKeyMaterial { id });
                continue;
            }

            if active_keys.iter().any(|key| key.fingerprint == fingerprint) {
                outcome.log.record_err(id.clone(), KeyError::AlreadyActive { id });
                continue;
            }

            match self
                .reactivate_single(owner, &mut active_keys, &id, key_pair, &wrap_context)
                .await
            {
                Ok(new_skl) => {
                    outcome.submissions += 1;
                    if let Some(new_skl) = new_skl {
                        outcome.new_skls.push((owner.id().clone(), new_skl));
                    }
                    outcome.log.record_ok(id);
                },
                Err(error) => {
                    if error.is_fatal() {
                        return Err(error);
                    }
                    warn!(key = %id, %error, "key reactivation failed");
                    outcome.log.record_err(id, error);
                },
            }
        }

        Ok(outcome)
    }

    /// Append one uploaded key to the active set and submit it. Rolls the
    /// local append back when the server rejects the mutation.
    async fn reactivate_single(
        &self,
        owner: &KeyOwner,
        active_keys: &mut Vec<ActiveKey<C::KeyPair>>,
        id: &KeyId,
        key_pair: C::KeyPair,
        wrap_context: &WrapContext<'_, C::KeyPair>,
    ) -> Result<Option<SignedKeyList>, KeyError> {
        // Reset the embedded identity to the owner's, so an export made
        // under a different identity string cannot reintroduce it.
        let key_pair = match owner.identity() {
            Some(identity) => self.codec.reformat(&key_pair, &identity).await?,
            None => key_pair,
        };

        let upload = self.rewrap(id, &key_pair, wrap_context).await?;

        active_keys.push(ActiveKey {
            id: id.clone(),
            fingerprint: self.codec.fingerprint(&key_pair),
            sha256_fingerprints: self.codec.sha256_fingerprints(&key_pair),
            flags: KeyFlags::baseline(),
            primary: active_keys.is_empty(),
            key_pair,
        });

        let submit = async {
            if owner.signs_key_list() {
                let (new_skl, pending) = keyloom_core::publish::build_with_deferred_publish(
                    &self.codec,
                    active_keys,
                    owner.id(),
                    self.transparency_ref(),
                )
                .await?;

                match self.transport.reactivate_key(owner.id(), upload, Some(&new_skl)).await {
                    Ok(()) => {
                        // The server committed the mutation; a transparency
                        // hiccup must not resurrect the previous list.
                        if let Err(confirm_error) = pending.confirm().await {
                            warn!(%confirm_error, "failed to confirm accepted key list");
                        }
                        Ok(Some(new_skl))
                    },
                    Err(error) => {
                        if let Err(discard_error) = pending.discard().await {
                            warn!(%discard_error, "failed to discard pending key list");
                        }
                        Err(KeyError::from(error))
                    },
                }
            } else {
                self.transport.reactivate_key(owner.id(), upload, None).await?;
                Ok(None)
            }
        };

        match submit.await {
            Ok(new_skl) => Ok(new_skl),
            Err(error) => {
                active_keys.pop();
                Err(error)
            },
        }
    }

    /// Infer reactivations from a credential change and submit them as one
    /// transaction.
    ///
    /// The resolver runs under both contexts for the user and every address.
    /// Decrypting strictly fewer keys under the new context than the old one
    /// is an invariant violation and aborts the whole batch before any
    /// submission. Newly decryptable keys are re-wrapped under the new
    /// context; all resulting address key lists are submitted together with
    /// the user-key updates, keyed by address id.
    pub async fn reactivate_inferred(
        &self,
        user: OwnerReactivation<C::KeyPair>,
        addresses: Vec<OwnerReactivation<C::KeyPair>>,
        new_primary_user_key: &C::KeyPair,
        organization_key: Option<&OrganizationKey<C::KeyPair>>,
        new_passphrase: &str,
    ) -> Result<ReactivationOutcome, KeyError> {
        let mut outcome = ReactivationOutcome::default();

        // Phase 1: resolve everything under both contexts and fail fast on a
        // monotonicity violation, before any key is re-wrapped.
        let user_plan = self.plan_owner(&user)?;
        let mut address_plans = Vec::with_capacity(addresses.len());
        for address in &addresses {
            address_plans.push(self.plan_owner(address)?);
        }

        // Phase 2: re-wrap reactivated keys and rebuild key lists.
        let mut user_keys = Vec::new();
        for (id, key_pair) in &user_plan.reactivated {
            // User keys stay passphrase-wrapped; they are the root of the
            // token hierarchy.
            let wrapped = self.codec.wrap(key_pair, new_passphrase).await;
            match wrapped {
                Ok(wrapped_private_key) => user_keys.push(WrappedKeyUpload {
                    id: Some(id.clone()),
                    wrapped_private_key,
                    token: None,
                    signature: None,
                    org_signature: None,
                }),
                Err(error) => {
                    outcome.log.record_err(id.clone(), KeyError::Codec(error));
                },
            }
        }

        let mut pending = Vec::new();
        let mut address_updates = Vec::new();
        for (address, plan) in addresses.iter().zip(&address_plans) {
            if plan.reactivated.is_empty() {
                self.report_still_missing(&mut outcome.log, plan);
                continue;
            }

            let migrated = address.owner.records().iter().all(KeyRecord::is_migrated);
            let mut keys = Vec::with_capacity(plan.reactivated.len());
            let mut failed = Vec::new();
            for (id, key_pair) in &plan.reactivated {
                let upload = if migrated {
                    let context = WrapContext::Token {
                        primary_user_key: new_primary_user_key,
                        organization_key,
                    };
                    self.rewrap(id, key_pair, &context).await
                } else {
                    self.rewrap(id, key_pair, &WrapContext::Passphrase {
                        passphrase: new_passphrase,
                    })
                    .await
                };
                match upload {
                    Ok(upload) => keys.push(upload),
                    Err(error) => {
                        if error.is_fatal() {
                            return Err(error);
                        }
                        outcome.log.record_err(id.clone(), error);
                        failed.push(id.clone());
                    },
                }
            }

            if keys.is_empty() {
                self.report_still_missing(&mut outcome.log, plan);
                continue;
            }

            // A key that could not be re-wrapped stays on its old wrapping
            // and must not be attested: the list embeds exactly the keys the
            // batch uploads on top of the already-active set.
            let mut attested: Vec<ActiveKey<C::KeyPair>> = plan
                .new_active
                .iter()
                .filter(|key| !failed.contains(&key.id))
                .cloned()
                .collect();
            normalize_primary(&mut attested);

            let (new_skl, publication) = keyloom_core::publish::build_with_deferred_publish(
                &self.codec,
                &attested,
                address.owner.id(),
                self.transparency_ref(),
            )
            .await?;
            pending.push(publication);
            address_updates.push(AddressReactivation {
                address_id: address.owner.id().clone(),
                keys,
                skl: new_skl,
            });
        }

        if user_keys.is_empty() && address_updates.is_empty() {
            debug!("no keys newly decryptable, nothing to reactivate");
            self.report_still_missing(&mut outcome.log, &user_plan);
            for plan in &address_plans {
                self.report_still_missing(&mut outcome.log, plan);
            }
            return Ok(outcome);
        }

        // Phase 3: one transaction for the user keys and every address
        // rebuild they unlocked.
        let batch = UserReactivationBatch {
            user_id: user.owner.id().clone(),
            user_keys,
            addresses: address_updates,
        };
        let attempted: Vec<&KeyId> = user_plan
            .reactivated
            .iter()
            .chain(address_plans.iter().flat_map(|plan| plan.reactivated.iter()))
            .map(|(id, _)| id)
            .collect();
        match self.transport.reactivate_user_batch(&batch).await {
            Ok(()) => {
                for publication in pending {
                    if let Err(confirm_error) = publication.confirm().await {
                        warn!(%confirm_error, "failed to confirm accepted key list");
                    }
                }
                outcome.submissions = 1;
                for id in outcome.log.unreported(attempted.iter().copied()) {
                    outcome.log.record_ok(id.clone());
                }
                for update in &batch.addresses {
                    outcome.new_skls.push((update.address_id.clone(), update.skl.clone()));
                }
            },
            Err(error) => {
                for publication in pending {
                    if let Err(discard_error) = publication.discard().await {
                        warn!(%discard_error, "failed to discard pending key list");
                    }
                }
                let error = KeyError::from(error);
                warn!(%error, "reactivation batch rejected");
                for id in outcome.log.unreported(attempted.iter().copied()) {
                    outcome.log.record_err(id.clone(), error.clone());
                }
            },
        }

        self.report_still_missing(&mut outcome.log, &user_plan);
        for plan in &address_plans {
            self.report_still_missing(&mut outcome.log, plan);
        }

        Ok(outcome)
    }

    /// Resolve one owner under both credential contexts and compute which
    /// keys newly became decryptable.
    fn plan_owner(
        &self,
        reactivation: &OwnerReactivation<C::KeyPair>,
    ) -> Result<OwnerPlan<C::KeyPair>, KeyError> {
        let owner = &reactivation.owner;
        let (old_active, _) = resolve(
            &self.codec,
            owner.attested_skl(),
            owner.records(),
            &reactivation.old_decrypted,
            KeyFlags::baseline(),
        )?;
        let (new_active, new_inactive) = resolve(
            &self.codec,
            owner.attested_skl(),
            owner.records(),
            &reactivation.new_decrypted,
            KeyFlags::baseline(),
        )?;

        if new_active.len() < old_active.len() {
            return Err(KeyError::InconsistentReactivation {
                before: old_active.len(),
                after: new_active.len(),
            });
        }

        let reactivated = new_active
            .iter()
            .filter(|key| !old_active.iter().any(|old| old.id == key.id))
            .map(|key| (key.id.clone(), key.key_pair.clone()))
            .collect();

        Ok(OwnerPlan {
            reactivated,
            still_missing: new_inactive.iter().map(|key| key.id.clone()).collect(),
            new_active,
        })
    }

    /// Record keys that remain undecryptable under the new context.
    fn report_still_missing(&self, log: &mut KeyActionLog, plan: &OwnerPlan<C::KeyPair>) {
        for id in log.unreported(plan.still_missing.iter()) {
            log.record_err(id.clone(), KeyError::MissingKeyMaterial { id: id.clone() });
        }
    }

    /// Re-wrap a key pair according to the wrap context.
    async fn rewrap(
        &self,
        id: &KeyId,
        key_pair: &C::KeyPair,
        wrap_context: &WrapContext<'_, C::KeyPair>,
    ) -> Result<WrappedKeyUpload, KeyError> {
        match wrap_context {
            WrapContext::Token { primary_user_key, organization_key } => {
                let wrap = token_wrap_key(
                    &self.codec,
                    &self.tokens,
                    key_pair,
                    primary_user_key,
                    *organization_key,
                )
                .await?;
                Ok(WrappedKeyUpload {
                    id: Some(id.clone()),
                    wrapped_private_key: wrap.wrapped_private_key,
                    token: Some(wrap.token),
                    signature: Some(wrap.signature),
                    org_signature: wrap.org_signature,
                })
            },
            WrapContext::Passphrase { passphrase } => {
                let wrapped_private_key = self.codec.wrap(key_pair, passphrase).await?;
                Ok(WrappedKeyUpload {
                    id: Some(id.clone()),
                    wrapped_private_key,
                    token: None,
                    signature: None,
                    org_signature: None,
                })
            },
        }
    }
}

/// Per-owner reactivation plan computed before any re-wrapping.
struct OwnerPlan<K> {
    /// Keys decryptable under the new context but not the old, with their
    /// decrypted pairs.
    reactivated: Vec<(KeyId, K)>,
    /// Keys still undecryptable under the new context.
    still_missing: Vec<KeyId>,
    /// The owner's full new active sequence.
    new_active: Vec<ActiveKey<K>>,
}
