//! Value types crossing the codec boundary.
//!
//! These are the serializable shapes the codec produces and consumes: key
//! fingerprints, detached signatures, encrypted wrap tokens, and key
//! identities. None of them carry private key material; the decrypted token
//! is the one secret here and zeroizes itself on drop.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Hex-encoded public fingerprint of a key pair.
///
/// Fingerprints are the stable identity used to correlate server key records,
/// attested key lists, and locally decrypted keys. Two records sharing a
/// fingerprint refer to the same underlying key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-encoded fingerprint string.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Armored detached signature produced by [`sign_detached`].
///
/// Opaque to the engines: produced by one codec call, verified by another,
/// stored server-side in between.
///
/// [`sign_detached`]: crate::KeyCodec::sign_detached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wrap an armored signature string.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Signature as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A wrap token encrypted to one or more public keys.
///
/// The plaintext token is the symmetric passphrase a v2 key record's private
/// key is wrapped under. Only the codec can open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedToken(String);

impl EncryptedToken {
    /// Wrap an armored encrypted token.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Encrypted token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// User identity embedded in a key pair (name + email).
///
/// Reactivation resets an uploaded key's identity to the owning address
/// before re-wrapping, so a key exported under a different identity string
/// cannot smuggle that identity back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIdentity {
    /// Display name, usually equal to the email.
    pub name: String,
    /// Email address the key is bound to.
    pub email: String,
}

impl KeyIdentity {
    /// Identity where the name equals the email address.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self { name: email.clone(), email }
    }
}

/// Decrypted wrap token. Zeroized on drop.
///
/// Exists only in memory between a `decrypt_token` call and the `unwrap` /
/// `wrap` call that consumes it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wrap a decrypted token string.
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Expose the token for use as a wrapping secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for SecretToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// Debug never prints the token itself.
impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_token_debug_is_redacted() {
        let token = SecretToken::new("deadbeef");
        assert_eq!(format!("{token:?}"), "SecretToken(..)");
    }

    #[test]
    fn identity_from_email_mirrors_name() {
        let id = KeyIdentity::from_email("a@b.test");
        assert_eq!(id.name, "a@b.test");
        assert_eq!(id.email, "a@b.test");
    }

    #[test]
    fn fingerprint_display_roundtrip() {
        let fp = Fingerprint::new("abc123");
        assert_eq!(fp.to_string(), "abc123");
        assert_eq!(Fingerprint::from("abc123"), fp);
    }
}
