//! Engine tuning knobs.

/// Configuration for organization-wide engine runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of owners processed concurrently during a batch.
    ///
    /// Work within one owner is always serialized regardless of this value.
    pub owner_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { owner_concurrency: 4 }
    }
}

impl EngineConfig {
    /// Effective concurrency limit; a configured zero behaves as one.
    pub fn effective_concurrency(&self) -> usize {
        self.owner_concurrency.max(1)
    }
}
