//! Key lifecycle engines: format migration and reactivation.
//!
//! The engines are synchronous logic over asynchronous I/O. All state is
//! owned by the caller and passed in; the only suspension points are codec
//! calls, server submissions, and key-transparency registrations. Within one
//! owner every key mutation is serialized (each signed key list embeds the
//! full active set, so a stale read would silently drop a sibling's entry);
//! across owners work fans out with a bounded concurrency limit.
//!
//! Cancellation is safe between owners: dropping an engine future leaves
//! already-submitted owners committed and not-yet-started owners untouched.
//! Futures are never dropped mid-owner by the engines themselves.

pub mod config;
pub mod migrate;
pub mod reactivate;
pub mod scope;
pub mod token;
pub mod transport;
mod wrap;

pub use config::EngineConfig;
pub use migrate::{KeyMigrationEngine, ManagedMember, MigratedKey, MigrationPayload, MigrationReport};
pub use reactivate::{
    KeyReactivationEngine, OwnerReactivation, ReactivationCandidate, ReactivationOutcome,
    WrapContext,
};
pub use scope::{AuthScope, ScopeSet};
pub use token::TokenSource;
pub use transport::{
    AddressReactivation, KeyTransport, TransportError, UserReactivationBatch, WrappedKeyUpload,
    WrappedOrganizationKey,
};
