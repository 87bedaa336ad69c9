//! Per-key outcome bookkeeping for batch operations.

use crate::{error::KeyError, record::KeyId};

/// Ordered log of per-key outcomes from a migration or reactivation batch.
///
/// Every key id fed into a batch ends up here exactly once, as `Ok(())` or a
/// terminal error. UI and telemetry consume this log; they never inspect
/// engine internals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyActionLog {
    entries: Vec<(KeyId, Result<(), KeyError>)>,
}

impl KeyActionLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful outcome for `id`.
    pub fn record_ok(&mut self, id: KeyId) {
        self.entries.push((id, Ok(())));
    }

    /// Record a terminal error for `id`.
    pub fn record_err(&mut self, id: KeyId, error: KeyError) {
        self.entries.push((id, Err(error)));
    }

    /// All outcomes in the order they were recorded.
    pub fn entries(&self) -> &[(KeyId, Result<(), KeyError>)] {
        &self.entries
    }

    /// Outcome for a specific key, if it was reported.
    pub fn outcome(&self, id: &KeyId) -> Option<&Result<(), KeyError>> {
        self.entries.iter().find(|(entry_id, _)| entry_id == id).map(|(_, result)| result)
    }

    /// Ids that completed successfully, in order.
    pub fn ok_ids(&self) -> Vec<&KeyId> {
        self.entries.iter().filter(|(_, result)| result.is_ok()).map(|(id, _)| id).collect()
    }

    /// Ids that failed, with their errors, in order.
    pub fn failures(&self) -> Vec<(&KeyId, &KeyError)> {
        self.entries
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|err| (id, err)))
            .collect()
    }

    /// Ids from `expected` that have no outcome recorded yet.
    ///
    /// Engines sweep this before returning, so callers never see a key
    /// silently skipped.
    pub fn unreported<'a>(&self, expected: impl IntoIterator<Item = &'a KeyId>) -> Vec<&'a KeyId> {
        expected
            .into_iter()
            .filter(|id| !self.entries.iter().any(|(entry_id, _)| entry_id == *id))
            .collect()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_keep_insertion_order() {
        let mut log = KeyActionLog::new();
        log.record_ok(KeyId::from("a"));
        log.record_err(KeyId::from("b"), KeyError::SignatureVerificationFailed);
        log.record_ok(KeyId::from("c"));

        assert_eq!(log.len(), 3);
        assert_eq!(log.ok_ids(), vec![&KeyId::from("a"), &KeyId::from("c")]);
        assert_eq!(
            log.failures(),
            vec![(&KeyId::from("b"), &KeyError::SignatureVerificationFailed)]
        );
    }

    #[test]
    fn unreported_finds_missing_ids() {
        let mut log = KeyActionLog::new();
        log.record_ok(KeyId::from("a"));

        let expected = [KeyId::from("a"), KeyId::from("b")];
        assert_eq!(log.unreported(expected.iter()), vec![&KeyId::from("b")]);
    }
}
