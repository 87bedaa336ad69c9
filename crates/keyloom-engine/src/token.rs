//! Wrap token generation.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Mutex;

use keyloom_codec::SecretToken;

/// Number of random bytes in a wrap token before hex encoding.
const TOKEN_BYTES: usize = 32;

/// Source of fresh wrap tokens.
///
/// A token is 32 bytes of cryptographically secure randomness, hex-encoded
/// so it can double as a passphrase. Tests use [`seeded`](Self::seeded) for
/// reproducible sequences.
pub struct TokenSource {
    rng: Mutex<ChaCha20Rng>,
}

impl TokenSource {
    /// Token source seeded from OS entropy.
    pub fn new() -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::from_entropy()) }
    }

    /// Deterministic token source for tests.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }

    /// Generate a fresh token.
    pub fn fresh_token(&self) -> SecretToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        match self.rng.lock() {
            Ok(mut rng) => rng.fill_bytes(&mut bytes),
            // A poisoned lock means another token generation panicked; the
            // RNG state itself is still safe to advance.
            Err(poisoned) => poisoned.into_inner().fill_bytes(&mut bytes),
        }
        SecretToken::new(hex::encode(bytes))
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_hex_of_expected_length() {
        let source = TokenSource::seeded(7);
        let token = source.fresh_token();
        assert_eq!(token.expose().len(), TOKEN_BYTES * 2);
        assert!(token.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn seeded_sources_repeat_and_differ_per_call() {
        let a = TokenSource::seeded(7);
        let b = TokenSource::seeded(7);
        let first_a = a.fresh_token();
        let first_b = b.fresh_token();
        assert_eq!(first_a.expose(), first_b.expose());
        assert_ne!(first_a.expose(), a.fresh_token().expose());
    }
}
