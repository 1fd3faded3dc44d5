//! Per-card Ed25519 signing keys.
//!
//! Every card gets its own key at issue time. The datastore treats the key as
//! an opaque credential: it is generated, persisted and loaded, but nothing in
//! the datastore signs with it.
use crate::errors::{CryptoError, CryptoResult};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use std::fmt;

/// Raw Ed25519 seed length, the storage format of a card key.
pub const SIGNING_SEED_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct CardSigningKey {
    seed: [u8; SIGNING_SEED_LEN],
}

impl CardSigningKey {
    pub fn generate() -> Self {
        let mut seed = [0u8; SIGNING_SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self { seed }
    }

    /// Load a key from its stored seed.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let seed: [u8; SIGNING_SEED_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            label: "signing key",
            expected: SIGNING_SEED_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self { seed })
    }

    pub fn as_bytes(&self) -> &[u8; SIGNING_SEED_LEN] {
        &self.seed
    }

    /// Public half derived from the seed.
    pub fn public_key(&self) -> [u8; 32] {
        SigningKey::from_bytes(&self.seed).verifying_key().to_bytes()
    }

    /// Short, non-secret identifier for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.public_key()[..8])
    }
}

impl fmt::Debug for CardSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSigningKey")
            .field("public", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique() {
        assert_ne!(CardSigningKey::generate(), CardSigningKey::generate());
    }

    #[test]
    fn stored_seed_reloads_same_key() {
        let key = CardSigningKey::generate();
        let reloaded = CardSigningKey::from_bytes(key.as_bytes()).expect("key");
        assert_eq!(key.public_key(), reloaded.public_key());
    }

    #[test]
    fn from_bytes_rejects_invalid_length() {
        let err = CardSigningKey::from_bytes(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("invalid signing key length"));
    }

    #[test]
    fn debug_shows_only_public_fingerprint() {
        let key = CardSigningKey::from_bytes(&[7u8; 32]).expect("key");
        let rendered = format!("{key:?}");
        assert!(rendered.contains(&key.fingerprint()));
        assert!(!rendered.contains(&hex::encode(key.as_bytes())));
    }
}
