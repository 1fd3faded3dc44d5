//! Argon2id credential hashing for bank and card passwords.
//!
//! # Purpose
//! Turn caller-supplied passwords into salted, deliberately expensive PHC
//! strings and verify candidates against them.
//!
//! # Key invariants
//! - A [`Password`] is either freshly set (plaintext still in hand for
//!   validation) or loaded from storage (hash only). Storage code only ever
//!   sees the [`PasswordHash`].
//! - Verification distinguishes a mismatch (`Ok(false)`) from a broken stored
//!   hash (`Err`).
//!
//! # Security model
//! - Argon2id with per-hash random salts; comparison inside `argon2` is
//!   constant time.
//! - Verification reads the cost parameters from the stored PHC string, so
//!   raising the configured cost never invalidates existing hashes.
use crate::errors::{CryptoError, CryptoResult};
use argon2::password_hash::{
    self, PasswordHash as PhcString, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use std::fmt;

/// Shortest accepted plaintext, in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;
/// Longest accepted plaintext, in characters; kept at 72 so existing
/// credential length rules carry over unchanged.
pub const MAX_PASSWORD_CHARS: usize = 72;

/// Stored credential: an Argon2id PHC string.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a PHC string loaded from storage.
    pub fn from_phc(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// A credential in one of its two lifecycle states.
#[derive(Clone)]
pub enum Password {
    /// Just hashed from caller input; the plaintext is kept only so it can be
    /// validated before the record is persisted.
    Fresh {
        plaintext: String,
        hash: PasswordHash,
    },
    /// Loaded from storage.
    Stored(PasswordHash),
}

impl Password {
    pub fn hash(&self) -> &PasswordHash {
        match self {
            Password::Fresh { hash, .. } => hash,
            Password::Stored(hash) => hash,
        }
    }

    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Password::Fresh { plaintext, .. } => Some(plaintext),
            Password::Stored(_) => None,
        }
    }

    /// Drop the plaintext (if any) and keep the persistable hash.
    pub fn into_hash(self) -> PasswordHash {
        match self {
            Password::Fresh { hash, .. } => hash,
            Password::Stored(hash) => hash,
        }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Password::Fresh { .. } => f.write_str("Password::Fresh(<redacted>)"),
            Password::Stored(_) => f.write_str("Password::Stored(<redacted>)"),
        }
    }
}

/// Argon2id hasher with a configurable cost.
///
/// The default cost (19 MiB, 2 passes, 1 lane) lands in the tens of
/// milliseconds on commodity hardware.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher {
    /// Build a hasher with explicit Argon2 cost parameters.
    ///
    /// # Errors
    /// - [`CryptoError::InvalidCost`] when `argon2` rejects the combination
    ///   (for example memory below `8 * parallelism` KiB).
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> CryptoResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| CryptoError::InvalidCost(err.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `plaintext` with a fresh random salt.
    pub fn set(&self, plaintext: &str) -> CryptoResult<Password> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| CryptoError::Hash(err.to_string()))?
            .to_string();
        Ok(Password::Fresh {
            plaintext: plaintext.to_string(),
            hash: PasswordHash(hash),
        })
    }

    /// Check `plaintext` against a stored hash.
    ///
    /// # Errors
    /// - [`CryptoError::MalformedHash`] when the stored value is not a PHC
    ///   string.
    /// - [`CryptoError::Hash`] for any verification failure other than a
    ///   plain mismatch.
    pub fn matches(&self, plaintext: &str, hash: &PasswordHash) -> CryptoResult<bool> {
        let parsed = PhcString::new(hash.as_str())
            .map_err(|err| CryptoError::MalformedHash(err.to_string()))?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CryptoError::Hash(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> CredentialHasher {
        CredentialHasher::with_cost(1024, 1, 1).expect("cost")
    }

    #[test]
    fn set_then_matches() {
        let hasher = cheap();
        let password = hasher.set("pa55word-long").expect("hash");
        assert_eq!(password.plaintext(), Some("pa55word-long"));
        assert!(password.hash().as_str().starts_with("$argon2id$"));
        assert!(hasher.matches("pa55word-long", password.hash()).expect("verify"));
    }

    #[test]
    fn mismatch_is_false_not_error() {
        let hasher = cheap();
        let password = hasher.set("pa55word-long").expect("hash");
        assert!(!hasher.matches("wrong-password", password.hash()).expect("verify"));
    }

    #[test]
    fn malformed_hash_is_error() {
        let err = cheap()
            .matches("whatever1", &PasswordHash::from_phc("not-a-phc-string"))
            .unwrap_err();
        assert!(matches!(err, CryptoError::MalformedHash(_)));
    }

    #[test]
    fn salts_differ_per_hash() {
        let hasher = cheap();
        let a = hasher.set("same-password").expect("hash");
        let b = hasher.set("same-password").expect("hash");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn verification_uses_cost_from_stored_hash() {
        let stored = cheap().set("pa55word-long").expect("hash").into_hash();
        let other = CredentialHasher::with_cost(2048, 2, 1).expect("cost");
        assert!(other.matches("pa55word-long", &stored).expect("verify"));
    }

    #[test]
    fn invalid_cost_rejected() {
        let err = CredentialHasher::with_cost(1, 1, 1).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidCost(_)));
    }

    #[test]
    fn debug_output_is_redacted() {
        let password = cheap().set("pa55word-long").expect("hash");
        let rendered = format!("{password:?} {:?}", password.hash());
        assert!(!rendered.contains("pa55word-long"));
        assert!(!rendered.contains("argon2id"));

        let stored = Password::Stored(password.into_hash());
        assert_eq!(stored.plaintext(), None);
    }
}
