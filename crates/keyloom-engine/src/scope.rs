//! Session authorization scopes.
//!
//! Organization-wide key mutations require a fresh re-authentication; the
//! caller extracts the scopes its session holds and the engine checks them
//! before touching any organization state.

use std::collections::BTreeSet;

/// An authorization scope a session may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthScope {
    /// Fresh password re-entry; required for organization key operations.
    Password,
    /// Organization administration.
    Organization,
}

impl AuthScope {
    /// Scope name as reported in errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Organization => "organization",
        }
    }
}

/// The set of scopes the current session holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: BTreeSet<AuthScope>,
}

impl ScopeSet {
    /// Empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the scopes a session reports.
    pub fn from_scopes(scopes: impl IntoIterator<Item = AuthScope>) -> Self {
        Self { scopes: scopes.into_iter().collect() }
    }

    /// Add a scope.
    pub fn grant(&mut self, scope: AuthScope) {
        self.scopes.insert(scope);
    }

    /// Whether the session holds `scope`.
    pub fn holds(&self, scope: AuthScope) -> bool {
        self.scopes.contains(&scope)
    }
}
