//! Core model for end-to-end-encryption key lifecycle management.
//!
//! This crate owns the pure logic shared by the migration and reactivation
//! engines: the server-side key record model, the reconciliation of locally
//! decryptable keys against a server-attested signed key list, the builder
//! for new signed key lists, and the per-key outcome log.
//!
//! Everything here is synchronous state transformation over caller-owned
//! data; the only async surfaces are the codec calls that sign or verify a
//! key list and the key-transparency registration of a pending list. Network
//! I/O lives in `keyloom-engine`.
//!
//! # Key state model
//!
//! A server key record is either *legacy* (private key wrapped directly under
//! the account passphrase) or *v2* (wrapped under a random token that is
//! itself encrypted to the user key and signed). Records whose private half
//! opens under the current credentials become [`ActiveKey`]s, ordered and
//! attested by a [`SignedKeyList`]; the rest become [`InactiveKey`]s awaiting
//! reactivation.

pub mod action_log;
pub mod active;
pub mod error;
pub mod flags;
pub mod owner;
pub mod publish;
pub mod record;
pub mod skl;

pub use action_log::KeyActionLog;
pub use active::{ActiveKey, InactiveKey, normalize_primary, resolve};
pub use error::KeyError;
pub use flags::KeyFlags;
pub use owner::{Address, KeyOwner, OrganizationKey, OwnerId};
pub use publish::{KeyTransparency, PendingHandle, PendingPublication, TransparencyError};
pub use record::{DecryptedKey, KeyId, KeyRecord, KeyWrapping};
pub use skl::{KeyListItem, SignedKeyList};
