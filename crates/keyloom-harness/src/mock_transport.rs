//! Recording mock of the server transport.

use std::{
    collections::HashSet,
    sync::Mutex,
};

use async_trait::async_trait;
use keyloom_core::{KeyFlags, KeyId, OwnerId, SignedKeyList};
use keyloom_engine::{
    KeyTransport, TransportError, UserReactivationBatch, WrappedKeyUpload,
    WrappedOrganizationKey,
    migrate::{ManagedMember, MigrationPayload},
};

/// One recorded server call, in arrival order.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum TransportCall {
    CreateKey { owner: OwnerId, upload: WrappedKeyUpload, skl: Option<SignedKeyList> },
    ReactivateKey { owner: OwnerId, upload: WrappedKeyUpload, skl: Option<SignedKeyList> },
    SetPrimary { owner: OwnerId, id: KeyId },
    SetFlags { owner: OwnerId, id: KeyId, flags: KeyFlags },
    RemoveKey { owner: OwnerId, id: KeyId },
    UpgradeMemberKeys { member_id: OwnerId, updates: Vec<(OwnerId, MigrationPayload)> },
    ReactivateUserBatch(UserReactivationBatch),
    FetchOrganizationKey,
    ListMembersPendingMigration,
}

#[derive(Default)]
struct Inner {
    calls: Vec<TransportCall>,
    fail_reactivate: HashSet<KeyId>,
    fail_upgrade: HashSet<OwnerId>,
    fail_user_batch: bool,
    organization_key: Option<WrappedOrganizationKey>,
    members: Vec<ManagedMember>,
    next_id: u64,
}

/// In-memory transport that records every call and can fail on demand.
///
/// All mutations succeed unless a failure was armed for the targeted key or
/// member. Tests hold the transport in an `Arc` (there is a blanket
/// [`KeyTransport`] impl for `Arc`) and inspect [`calls`](Self::calls)
/// afterwards.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    /// Empty transport with no members and no organization key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a failure for the next `reactivate_key` call targeting `id`.
    pub fn fail_reactivate(&self, id: KeyId) {
        self.lock().fail_reactivate.insert(id);
    }

    /// Arm a failure for `upgrade_member_keys` calls for `member_id`.
    pub fn fail_upgrade(&self, member_id: OwnerId) {
        self.lock().fail_upgrade.insert(member_id);
    }

    /// Make every `reactivate_user_batch` call fail.
    pub fn fail_user_batch(&self) {
        self.lock().fail_user_batch = true;
    }

    /// Set the organization key record served by `fetch_organization_key`.
    pub fn set_organization_key(&self, key: WrappedOrganizationKey) {
        self.lock().organization_key = Some(key);
    }

    /// Set the members served by `list_members_pending_migration`.
    pub fn set_members(&self, members: Vec<ManagedMember>) {
        self.lock().members = members;
    }

    /// All calls recorded so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Number of calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: TransportCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl KeyTransport for MockTransport {
    async fn create_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<KeyId, TransportError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = KeyId::new(format!("srv-key-{}", inner.next_id));
        inner.calls.push(TransportCall::CreateKey {
            owner: owner.clone(),
            upload,
            skl: skl.cloned(),
        });
        Ok(id)
    }

    async fn reactivate_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        let armed = upload
            .id
            .as_ref()
            .is_some_and(|id| self.lock().fail_reactivate.remove(id));
        self.record(TransportCall::ReactivateKey {
            owner: owner.clone(),
            upload,
            skl: skl.cloned(),
        });
        if armed {
            return Err(TransportError("injected reactivate failure".into()));
        }
        Ok(())
    }

    async fn set_primary(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        _skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SetPrimary { owner: owner.clone(), id: id.clone() });
        Ok(())
    }

    async fn set_flags(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        flags: KeyFlags,
        _skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SetFlags { owner: owner.clone(), id: id.clone(), flags });
        Ok(())
    }

    async fn remove_key(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        _skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::RemoveKey { owner: owner.clone(), id: id.clone() });
        Ok(())
    }

    async fn upgrade_member_keys(
        &self,
        member_id: &OwnerId,
        updates: &[(OwnerId, MigrationPayload)],
    ) -> Result<(), TransportError> {
        let armed = self.lock().fail_upgrade.remove(member_id);
        self.record(TransportCall::UpgradeMemberKeys {
            member_id: member_id.clone(),
            updates: updates.to_vec(),
        });
        if armed {
            return Err(TransportError("injected upgrade failure".into()));
        }
        Ok(())
    }

    async fn reactivate_user_batch(
        &self,
        batch: &UserReactivationBatch,
    ) -> Result<(), TransportError> {
        let armed = self.lock().fail_user_batch;
        self.record(TransportCall::ReactivateUserBatch(batch.clone()));
        if armed {
            return Err(TransportError("injected batch failure".into()));
        }
        Ok(())
    }

    async fn fetch_organization_key(&self) -> Result<WrappedOrganizationKey, TransportError> {
        self.record(TransportCall::FetchOrganizationKey);
        self.lock()
            .organization_key
            .clone()
            .ok_or_else(|| TransportError("no organization key configured".into()))
    }

    async fn list_members_pending_migration(&self) -> Result<Vec<ManagedMember>, TransportError> {
        self.record(TransportCall::ListMembersPendingMigration);
        Ok(self.lock().members.clone())
    }
}
