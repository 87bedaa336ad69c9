//! Two-phase publication of signed key lists.
//!
//! A client must never tell the key-transparency layer that a key list took
//! effect before the server durably accepted the mutation it accompanies. A
//! freshly built list is therefore registered as *pending*, and the
//! [`PendingPublication`] guard holds the registration until the server call
//! either succeeds (confirm) or fails (discard). A signed-but-rejected list
//! must never poison the transparency log.

use async_trait::async_trait;
use keyloom_codec::KeyCodec;
use thiserror::Error;

use crate::{
    active::ActiveKey,
    error::KeyError,
    owner::OwnerId,
    skl::{self, SignedKeyList},
};

/// Opaque handle to a pending key-transparency registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingHandle(u64);

impl PendingHandle {
    /// Wrap a collaborator-assigned handle value.
    pub fn new(inner: u64) -> Self {
        Self(inner)
    }

    /// Raw handle value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Failure reported by the key-transparency collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("key transparency failure: {0}")]
pub struct TransparencyError(pub String);

/// The key-transparency audit collaborator.
///
/// Optional: owners without transparency coverage pass `None` and get inert
/// guards.
#[async_trait]
pub trait KeyTransparency: Send + Sync {
    /// Register a freshly signed list as pending for `owner`.
    async fn register_pending(
        &self,
        owner: &OwnerId,
        skl: &SignedKeyList,
    ) -> Result<PendingHandle, TransparencyError>;

    /// Mark a pending registration as durable.
    async fn confirm(&self, handle: PendingHandle) -> Result<(), TransparencyError>;

    /// Drop a pending registration whose server mutation failed.
    async fn discard(&self, handle: PendingHandle) -> Result<(), TransparencyError>;
}

/// Guard over a pending key-list registration.
///
/// Exactly one of [`confirm`](Self::confirm) or [`discard`](Self::discard)
/// must be called, after the accompanying server mutation succeeded or
/// failed respectively.
#[must_use = "a pending publication must be confirmed or discarded"]
pub struct PendingPublication<'a> {
    transparency: Option<&'a dyn KeyTransparency>,
    handle: Option<PendingHandle>,
}

impl<'a> PendingPublication<'a> {
    /// Register `skl` as pending with the transparency collaborator.
    ///
    /// With no collaborator present the returned guard is inert.
    pub async fn register(
        transparency: Option<&'a dyn KeyTransparency>,
        owner: &OwnerId,
        skl: &SignedKeyList,
    ) -> Result<PendingPublication<'a>, TransparencyError> {
        let handle = match transparency {
            Some(transparency) => Some(transparency.register_pending(owner, skl).await?),
            None => None,
        };
        Ok(Self { transparency, handle })
    }

    /// Confirm the registration. Call only after the server accepted the
    /// mutation this list accompanies.
    pub async fn confirm(self) -> Result<(), TransparencyError> {
        match (self.transparency, self.handle) {
            (Some(transparency), Some(handle)) => transparency.confirm(handle).await,
            _ => Ok(()),
        }
    }

    /// Discard the registration after a failed server mutation.
    pub async fn discard(self) -> Result<(), TransparencyError> {
        match (self.transparency, self.handle) {
            (Some(transparency), Some(handle)) => transparency.discard(handle).await,
            _ => Ok(()),
        }
    }
}

/// Build a signed key list and register it as pending in one step.
///
/// The returned guard must be confirmed only once the server has accepted
/// the mutation the list accompanies; on failure it must be discarded.
pub async fn build_with_deferred_publish<'a, C: KeyCodec>(
    codec: &C,
    active_keys: &[ActiveKey<C::KeyPair>],
    owner: &OwnerId,
    transparency: Option<&'a dyn KeyTransparency>,
) -> Result<(SignedKeyList, PendingPublication<'a>), KeyError> {
    let skl = skl::build(codec, active_keys).await?;
    let pending = PendingPublication::register(transparency, owner, &skl).await?;
    Ok((skl, pending))
}
