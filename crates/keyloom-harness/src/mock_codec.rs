//! Mock key codec backed by seeds, digests and keyed MACs.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use keyloom_codec::{
    CodecError, EncryptedToken, Fingerprint, KeyCodec, KeyIdentity, SecretToken, Signature,
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SEED_BYTES: usize = 32;

/// A mock key pair: a 32-byte seed plus the identity it is bound to.
///
/// The seed is the whole key; fingerprints, signatures and token seals are
/// all derived from it, so two pairs with the same seed are the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockKeyPair {
    seed: [u8; SEED_BYTES],
    identity: KeyIdentity,
}

impl MockKeyPair {
    /// Key pair with a fully caller-chosen seed.
    pub fn from_seed(seed: [u8; SEED_BYTES], identity: KeyIdentity) -> Self {
        Self { seed, identity }
    }

    /// Deterministic key pair where every seed byte is `tag`.
    ///
    /// Distinct tags give distinct keys; reusing a tag reuses the key, which
    /// is how tests fabricate duplicate fingerprints.
    pub fn tagged(tag: u8, email: &str) -> Self {
        Self { seed: [tag; SEED_BYTES], identity: KeyIdentity::from_email(email) }
    }

    /// The identity this pair is bound to.
    pub fn identity(&self) -> &KeyIdentity {
        &self.identity
    }

    /// Public fingerprint of this pair.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(fingerprint_hex(&self.seed))
    }
}

/// Private-key envelope stored as the "wrapped" bytes.
///
/// The seed is sealed by XOR with a secret-derived pad; the MAC binds the
/// seed to the secret so a wrong secret is detected rather than yielding a
/// garbage key.
#[derive(Serialize, Deserialize)]
struct WrapEnvelope {
    fingerprint: String,
    name: String,
    email: String,
    sealed_seed: Vec<u8>,
    mac: Vec<u8>,
}

/// Per-recipient entry of an encrypted token.
#[derive(Serialize, Deserialize)]
struct TokenEntry {
    fingerprint: String,
    sealed: Vec<u8>,
}

/// Deterministic software codec for tests.
///
/// Cloning shares the underlying RNG, so a seeded codec handed to an engine
/// and kept by the test produce one reproducible stream of generated keys.
#[derive(Clone)]
pub struct MockCodec {
    rng: Arc<Mutex<ChaCha20Rng>>,
    wrap_failures: Arc<Mutex<HashSet<String>>>,
}

impl MockCodec {
    /// Codec seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::from_entropy())),
            wrap_failures: Arc::default(),
        }
    }

    /// Deterministic codec for reproducible key generation.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            wrap_failures: Arc::default(),
        }
    }

    /// Make the next `wrap` of the key with this fingerprint fail.
    pub fn fail_wrap(&self, fingerprint: Fingerprint) {
        self.lock_wrap_failures().insert(fingerprint.as_str().to_owned());
    }

    fn next_seed(&self) -> [u8; SEED_BYTES] {
        let mut seed = [0u8; SEED_BYTES];
        match self.rng.lock() {
            Ok(mut rng) => rng.fill_bytes(&mut seed),
            Err(poisoned) => poisoned.into_inner().fill_bytes(&mut seed),
        }
        seed
    }

    fn lock_wrap_failures(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.wrap_failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn fingerprint_hex(seed: &[u8; SEED_BYTES]) -> String {
    let mut hex = hex::encode(digest(&[seed]));
    hex.truncate(40);
    hex
}

fn keyed_mac(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|error| CodecError::Backend(error.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// XOR `data` with a keystream derived from `seed` and `label`.
fn seal(seed: &[u8; SEED_BYTES], label: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut counter = 0u64;
    while out.len() < data.len() {
        let block = digest(&[seed, label, &counter.to_be_bytes()]);
        for byte in block {
            if out.len() == data.len() {
                break;
            }
            out.push(data[out.len()] ^ byte);
        }
        counter += 1;
    }
    out
}

fn secret_seed(secret: &str) -> [u8; SEED_BYTES] {
    digest(&[b"secret", secret.as_bytes()])
}

#[async_trait]
impl KeyCodec for MockCodec {
    type KeyPair = MockKeyPair;

    async fn generate(&self, identity: &KeyIdentity) -> Result<MockKeyPair, CodecError> {
        Ok(MockKeyPair { seed: self.next_seed(), identity: identity.clone() })
    }

    async fn wrap(&self, key_pair: &MockKeyPair, secret: &str) -> Result<Bytes, CodecError> {
        // Armed failures fire once, keyed by fingerprint.
        if self.lock_wrap_failures().remove(&fingerprint_hex(&key_pair.seed)) {
            return Err(CodecError::Backend("injected wrap failure".into()));
        }
        let pad = secret_seed(secret);
        let envelope = WrapEnvelope {
            fingerprint: fingerprint_hex(&key_pair.seed),
            name: key_pair.identity.name.clone(),
            email: key_pair.identity.email.clone(),
            sealed_seed: seal(&pad, b"seal", &key_pair.seed),
            mac: keyed_mac(&digest(&[b"mac", &pad]), &key_pair.seed)?,
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&envelope, &mut bytes)
            .map_err(|error| CodecError::Backend(error.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    async fn unwrap(&self, wrapped: &[u8], secret: &str) -> Result<MockKeyPair, CodecError> {
        let envelope: WrapEnvelope = ciborium::de::from_reader(wrapped)
            .map_err(|error| CodecError::Decode(error.to_string()))?;
        let pad = secret_seed(secret);
        let seed: [u8; SEED_BYTES] = seal(&pad, b"seal", &envelope.sealed_seed)
            .try_into()
            .map_err(|_| CodecError::Decode("sealed seed has wrong length".into()))?;

        let expected = keyed_mac(&digest(&[b"mac", &pad]), &seed)?;
        if expected != envelope.mac {
            return Err(CodecError::WrongSecret);
        }

        Ok(MockKeyPair {
            seed,
            identity: KeyIdentity { name: envelope.name, email: envelope.email },
        })
    }

    async fn reformat(
        &self,
        key_pair: &MockKeyPair,
        identity: &KeyIdentity,
    ) -> Result<MockKeyPair, CodecError> {
        Ok(MockKeyPair { seed: key_pair.seed, identity: identity.clone() })
    }

    async fn sign_detached(
        &self,
        data: &[u8],
        key_pair: &MockKeyPair,
    ) -> Result<Signature, CodecError> {
        let mac = keyed_mac(&digest(&[b"sign", &key_pair.seed]), data)?;
        Ok(Signature::new(hex::encode(mac)))
    }

    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &Signature,
        key_pair: &MockKeyPair,
    ) -> Result<bool, CodecError> {
        let mac = keyed_mac(&digest(&[b"sign", &key_pair.seed]), data)?;
        Ok(signature.as_str() == hex::encode(mac))
    }

    async fn encrypt_token(
        &self,
        token: &SecretToken,
        recipients: &[MockKeyPair],
    ) -> Result<EncryptedToken, CodecError> {
        let entries: Vec<TokenEntry> = recipients
            .iter()
            .map(|recipient| TokenEntry {
                fingerprint: fingerprint_hex(&recipient.seed),
                sealed: seal(&recipient.seed, b"token", token.expose().as_bytes()),
            })
            .collect();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&entries, &mut bytes)
            .map_err(|error| CodecError::Backend(error.to_string()))?;
        Ok(EncryptedToken::new(hex::encode(bytes)))
    }

    async fn decrypt_token(
        &self,
        token: &EncryptedToken,
        key_pair: &MockKeyPair,
    ) -> Result<SecretToken, CodecError> {
        let bytes = hex::decode(token.as_str())
            .map_err(|error| CodecError::TokenDecrypt(error.to_string()))?;
        let entries: Vec<TokenEntry> = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|error| CodecError::TokenDecrypt(error.to_string()))?;

        let fingerprint = fingerprint_hex(&key_pair.seed);
        let entry = entries
            .into_iter()
            .find(|entry| entry.fingerprint == fingerprint)
            .ok_or_else(|| CodecError::TokenDecrypt("not encrypted to this key".into()))?;

        let plain = seal(&key_pair.seed, b"token", &entry.sealed);
        let token = String::from_utf8(plain)
            .map_err(|error| CodecError::TokenDecrypt(error.to_string()))?;
        Ok(SecretToken::new(token))
    }

    fn fingerprint(&self, key_pair: &MockKeyPair) -> Fingerprint {
        key_pair.fingerprint()
    }

    fn sha256_fingerprints(&self, key_pair: &MockKeyPair) -> Vec<String> {
        vec![
            hex::encode(digest(&[&key_pair.seed])),
            hex::encode(digest(&[b"sub", &key_pair.seed])),
        ]
    }

    fn public_fingerprint(&self, wrapped: &[u8]) -> Option<Fingerprint> {
        let envelope: WrapEnvelope = ciborium::de::from_reader(wrapped).ok()?;
        Some(Fingerprint::new(envelope.fingerprint))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_roundtrips_and_rejects_wrong_secret() {
        let codec = MockCodec::seeded(1);
        let pair = MockKeyPair::tagged(7, "a@b.test");

        let wrapped = codec.wrap(&pair, "right").await.unwrap();
        let reopened = codec.unwrap(&wrapped, "right").await.unwrap();
        assert_eq!(reopened, pair);

        assert_eq!(codec.unwrap(&wrapped, "wrong").await, Err(CodecError::WrongSecret));
    }

    #[tokio::test]
    async fn public_fingerprint_needs_no_secret() {
        let codec = MockCodec::seeded(1);
        let pair = MockKeyPair::tagged(9, "a@b.test");
        let wrapped = codec.wrap(&pair, "secret").await.unwrap();
        assert_eq!(codec.public_fingerprint(&wrapped), Some(pair.fingerprint()));
        assert_eq!(codec.public_fingerprint(b"not an envelope"), None);
    }

    #[tokio::test]
    async fn token_opens_only_for_recipients() {
        let codec = MockCodec::seeded(1);
        let alice = MockKeyPair::tagged(1, "alice@test");
        let bob = MockKeyPair::tagged(2, "bob@test");
        let eve = MockKeyPair::tagged(3, "eve@test");

        let token = SecretToken::new("cafebabe");
        let encrypted =
            codec.encrypt_token(&token, &[alice.clone(), bob.clone()]).await.unwrap();

        assert_eq!(codec.decrypt_token(&encrypted, &alice).await.unwrap(), token);
        assert_eq!(codec.decrypt_token(&encrypted, &bob).await.unwrap(), token);
        assert!(codec.decrypt_token(&encrypted, &eve).await.is_err());
    }

    #[tokio::test]
    async fn signatures_verify_and_bind_to_key_and_data() {
        let codec = MockCodec::seeded(1);
        let pair = MockKeyPair::tagged(4, "a@b.test");
        let other = MockKeyPair::tagged(5, "a@b.test");

        let signature = codec.sign_detached(b"hello", &pair).await.unwrap();
        assert!(codec.verify_detached(b"hello", &signature, &pair).await.unwrap());
        assert!(!codec.verify_detached(b"other", &signature, &pair).await.unwrap());
        assert!(!codec.verify_detached(b"hello", &signature, &other).await.unwrap());
    }

    #[tokio::test]
    async fn reformat_keeps_the_fingerprint() {
        let codec = MockCodec::seeded(1);
        let pair = codec.generate(&KeyIdentity::from_email("old@test")).await.unwrap();
        let reformatted =
            codec.reformat(&pair, &KeyIdentity::from_email("new@test")).await.unwrap();
        assert_eq!(codec.fingerprint(&reformatted), codec.fingerprint(&pair));
        assert_eq!(reformatted.identity().email, "new@test");
    }

    #[tokio::test]
    async fn seeded_codecs_generate_identical_keys() {
        let identity = KeyIdentity::from_email("a@b.test");
        let a = MockCodec::seeded(42).generate(&identity).await.unwrap();
        let b = MockCodec::seeded(42).generate(&identity).await.unwrap();
        assert_eq!(a, b);
    }
}
