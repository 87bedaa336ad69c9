//! Server transport boundary.
//!
//! One call per key-record mutation, each carrying the wrapped bytes, the
//! optional wrap-token fields, and the signed key list that attests the
//! resulting active set. The transport is the durability point: an engine
//! only confirms a pending key-list publication after the corresponding call
//! returns.

use async_trait::async_trait;
use bytes::Bytes;
use keyloom_codec::{EncryptedToken, Signature};
use keyloom_core::{KeyFlags, KeyId, OwnerId, SignedKeyList};
use thiserror::Error;

use crate::migrate::{ManagedMember, MigrationPayload};

/// Opaque transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl From<TransportError> for keyloom_core::KeyError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.0)
    }
}

/// A wrapped key as uploaded to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKeyUpload {
    /// Target record id; `None` for creation (the server assigns one).
    pub id: Option<KeyId>,
    /// Wrapped private key bytes.
    pub wrapped_private_key: Bytes,
    /// Encrypted wrap token, present for v2 wrapping.
    pub token: Option<EncryptedToken>,
    /// User-key signature over the token, present for v2 wrapping.
    pub signature: Option<Signature>,
    /// Organization co-signature, present for managed members.
    pub org_signature: Option<Signature>,
}

/// The organization key as stored server-side.
#[derive(Debug, Clone)]
pub struct WrappedOrganizationKey {
    /// Wrapped private key bytes, opened by the admin's key passphrase.
    pub wrapped_private_key: Bytes,
}

/// Re-wrapped keys and the new signed key list for one address, part of a
/// user-key reactivation batch.
#[derive(Debug, Clone)]
pub struct AddressReactivation {
    /// The address whose key list is being rebuilt.
    pub address_id: OwnerId,
    /// Re-wrapped reactivated keys of this address.
    pub keys: Vec<WrappedKeyUpload>,
    /// The rebuilt signed key list covering the full active set.
    pub skl: SignedKeyList,
}

/// One consistent transaction reactivating user keys together with every
/// address key list they unlocked.
#[derive(Debug, Clone)]
pub struct UserReactivationBatch {
    /// The user whose credential change triggered the reactivation.
    pub user_id: OwnerId,
    /// Re-wrapped reactivated user keys.
    pub user_keys: Vec<WrappedKeyUpload>,
    /// Address-level rebuilds, keyed by address id.
    pub addresses: Vec<AddressReactivation>,
}

/// Server calls the engines depend on.
///
/// Implementations translate these to the HTTP API; the engines never see a
/// session or a URL.
#[async_trait]
pub trait KeyTransport: Send + Sync {
    /// Create a key record for `owner`. Returns the server-assigned id.
    async fn create_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<KeyId, TransportError>;

    /// Reactivate an existing record with freshly re-wrapped material.
    async fn reactivate_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError>;

    /// Mark a record as the owner's primary.
    async fn set_primary(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError>;

    /// Update a record's capability flags.
    async fn set_flags(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        flags: KeyFlags,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError>;

    /// Remove a record from the owner's key set.
    async fn remove_key(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError>;

    /// Submit one member's full migration (all owners) as a single update.
    async fn upgrade_member_keys(
        &self,
        member_id: &OwnerId,
        updates: &[(OwnerId, MigrationPayload)],
    ) -> Result<(), TransportError>;

    /// Submit a user-key reactivation together with all address key-list
    /// rebuilds it caused, as one transaction.
    async fn reactivate_user_batch(
        &self,
        batch: &UserReactivationBatch,
    ) -> Result<(), TransportError>;

    /// Fetch the organization key record.
    async fn fetch_organization_key(&self) -> Result<WrappedOrganizationKey, TransportError>;

    /// Enumerate managed members whose keys still need migration.
    async fn list_members_pending_migration(&self) -> Result<Vec<ManagedMember>, TransportError>;
}

#[async_trait]
impl<T: KeyTransport + ?Sized> KeyTransport for std::sync::Arc<T> {
    async fn create_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<KeyId, TransportError> {
        (**self).create_key(owner, upload, skl).await
    }

    async fn reactivate_key(
        &self,
        owner: &OwnerId,
        upload: WrappedKeyUpload,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        (**self).reactivate_key(owner, upload, skl).await
    }

    async fn set_primary(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        (**self).set_primary(owner, id, skl).await
    }

    async fn set_flags(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        flags: KeyFlags,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        (**self).set_flags(owner, id, flags, skl).await
    }

    async fn remove_key(
        &self,
        owner: &OwnerId,
        id: &KeyId,
        skl: Option<&SignedKeyList>,
    ) -> Result<(), TransportError> {
        (**self).remove_key(owner, id, skl).await
    }

    async fn upgrade_member_keys(
        &self,
        member_id: &OwnerId,
        updates: &[(OwnerId, MigrationPayload)],
    ) -> Result<(), TransportError> {
        (**self).upgrade_member_keys(member_id, updates).await
    }

    async fn reactivate_user_batch(
        &self,
        batch: &UserReactivationBatch,
    ) -> Result<(), TransportError> {
        (**self).reactivate_user_batch(batch).await
    }

    async fn fetch_organization_key(&self) -> Result<WrappedOrganizationKey, TransportError> {
        (**self).fetch_organization_key().await
    }

    async fn list_members_pending_migration(&self) -> Result<Vec<ManagedMember>, TransportError> {
        (**self).list_members_pending_migration().await
    }
}
