//! Recording mock of the key-transparency collaborator.

use std::sync::Mutex;

use async_trait::async_trait;
use keyloom_core::{
    KeyTransparency, OwnerId, PendingHandle, SignedKeyList, TransparencyError,
};

/// One recorded transparency interaction, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransparencyEvent {
    /// A key list was registered as pending for an owner.
    Registered {
        /// The owner the list belongs to.
        owner: OwnerId,
        /// Handle assigned to the registration.
        handle: PendingHandle,
    },
    /// A pending registration was confirmed.
    Confirmed(PendingHandle),
    /// A pending registration was discarded.
    Discarded(PendingHandle),
}

/// In-memory transparency collaborator that records every interaction.
///
/// Handles are assigned sequentially starting at 1, so tests can assert the
/// exact register/confirm/discard ordering an engine produced.
#[derive(Default)]
pub struct MockTransparency {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<TransparencyEvent>,
    next_handle: u64,
    fail_register: bool,
    fail_confirm: bool,
}

impl MockTransparency {
    /// Collaborator that accepts every registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `register_pending` call fail.
    pub fn fail_register(&self) {
        self.lock().fail_register = true;
    }

    /// Make every `confirm` call fail.
    pub fn fail_confirm(&self) {
        self.lock().fail_confirm = true;
    }

    /// All events recorded so far, in order.
    pub fn events(&self) -> Vec<TransparencyEvent> {
        self.lock().events.clone()
    }

    /// Handles registered but neither confirmed nor discarded.
    pub fn unresolved(&self) -> Vec<PendingHandle> {
        let events = self.lock().events.clone();
        events
            .iter()
            .filter_map(|event| match event {
                TransparencyEvent::Registered { handle, .. } => Some(*handle),
                _ => None,
            })
            .filter(|handle| {
                !events.iter().any(|event| {
                    matches!(event,
                        TransparencyEvent::Confirmed(h) | TransparencyEvent::Discarded(h)
                            if h == handle)
                })
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl KeyTransparency for MockTransparency {
    async fn register_pending(
        &self,
        owner: &OwnerId,
        _skl: &SignedKeyList,
    ) -> Result<PendingHandle, TransparencyError> {
        let mut inner = self.lock();
        if inner.fail_register {
            return Err(TransparencyError("injected register failure".into()));
        }
        inner.next_handle += 1;
        let handle = PendingHandle::new(inner.next_handle);
        inner.events.push(TransparencyEvent::Registered { owner: owner.clone(), handle });
        Ok(handle)
    }

    async fn confirm(&self, handle: PendingHandle) -> Result<(), TransparencyError> {
        let mut inner = self.lock();
        if inner.fail_confirm {
            return Err(TransparencyError("injected confirm failure".into()));
        }
        inner.events.push(TransparencyEvent::Confirmed(handle));
        Ok(())
    }

    async fn discard(&self, handle: PendingHandle) -> Result<(), TransparencyError> {
        self.lock().events.push(TransparencyEvent::Discarded(handle));
        Ok(())
    }
}
