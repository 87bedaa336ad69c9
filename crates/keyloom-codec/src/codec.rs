//! The `KeyCodec` trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::CodecError,
    types::{EncryptedToken, Fingerprint, KeyIdentity, SecretToken, Signature},
};

/// Capability interface over asymmetric key material.
///
/// Implementations own all cryptography: key pairs are handed out as opaque
/// [`KeyPair`](Self::KeyPair) handles that the engines clone and pass back
/// but never inspect. Wrapped keys are byte blobs whose layout only the codec
/// understands.
///
/// Cryptographic operations are async because implementations may offload
/// them (worker threads, WASM workers, HSMs). Fingerprint accessors are sync:
/// they read cached public metadata off the handle.
#[async_trait]
pub trait KeyCodec: Send + Sync {
    /// Opaque decrypted key pair handle.
    type KeyPair: Clone + Send + Sync;

    /// Generate a fresh key pair bound to `identity`.
    async fn generate(&self, identity: &KeyIdentity) -> Result<Self::KeyPair, CodecError>;

    /// Export the private half wrapped under `secret` as a passphrase.
    async fn wrap(&self, key_pair: &Self::KeyPair, secret: &str) -> Result<Bytes, CodecError>;

    /// Import a wrapped private key, unwrapping it with `secret`.
    ///
    /// Fails with [`CodecError::WrongSecret`] when the bytes parse but the
    /// secret does not open them; this is the signal the active-key resolver
    /// relies on to classify a record as inactive.
    async fn unwrap(&self, wrapped: &[u8], secret: &str) -> Result<Self::KeyPair, CodecError>;

    /// Re-issue `key_pair` with its embedded identity replaced by `identity`.
    ///
    /// The key material itself (and therefore the fingerprint) is unchanged.
    async fn reformat(
        &self,
        key_pair: &Self::KeyPair,
        identity: &KeyIdentity,
    ) -> Result<Self::KeyPair, CodecError>;

    /// Produce a detached signature over `data` with the private half.
    async fn sign_detached(
        &self,
        data: &[u8],
        key_pair: &Self::KeyPair,
    ) -> Result<Signature, CodecError>;

    /// Verify a detached signature against the public half.
    ///
    /// Returns `Ok(false)` for a well-formed but invalid signature; `Err` is
    /// reserved for backend failures.
    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &Signature,
        key_pair: &Self::KeyPair,
    ) -> Result<bool, CodecError>;

    /// Encrypt a wrap token to the public halves of `recipients`.
    ///
    /// Any single recipient can later decrypt it.
    async fn encrypt_token(
        &self,
        token: &SecretToken,
        recipients: &[Self::KeyPair],
    ) -> Result<EncryptedToken, CodecError>;

    /// Decrypt a wrap token with any one recipient key pair.
    async fn decrypt_token(
        &self,
        token: &EncryptedToken,
        key_pair: &Self::KeyPair,
    ) -> Result<SecretToken, CodecError>;

    /// Public fingerprint of a decrypted key pair.
    fn fingerprint(&self, key_pair: &Self::KeyPair) -> Fingerprint;

    /// SHA-256 fingerprints of the key and all its subkeys.
    fn sha256_fingerprints(&self, key_pair: &Self::KeyPair) -> Vec<String>;

    /// Fingerprint recovered from the public portion of wrapped bytes.
    ///
    /// Does not require the wrapping secret, so it works on records whose
    /// private half cannot currently be opened. `None` when the public
    /// portion itself is unreadable.
    fn public_fingerprint(&self, wrapped: &[u8]) -> Option<Fingerprint>;
}
