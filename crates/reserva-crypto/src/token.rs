//! Opaque bearer token secrets.
//!
//! # Purpose
//! Generate the random secret handed to a caller once, and the SHA-256 digest
//! that is the only thing the datastore keeps.
//!
//! # Security model
//! - 16 bytes from the OS CSPRNG; guessing is not a practical attack.
//! - A leaked `tokens` table yields digests, which cannot be presented as
//!   tokens.
use crate::errors::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Random bytes behind every token.
pub const TOKEN_SECRET_BYTES: usize = 16;
/// Length of the transport encoding of [`TOKEN_SECRET_BYTES`] bytes.
pub const TOKEN_PLAINTEXT_LEN: usize = 22;

const DIGEST_LEN: usize = 32;

/// SHA-256 digest of a token plaintext, as persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest([u8; DIGEST_LEN]);

impl TokenDigest {
    /// Digest a presented plaintext for lookup.
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    /// Rebuild a digest read back from storage.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            label: "token digest",
            expected: DIGEST_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenDigest({}..)", hex::encode(&self.0[..4]))
    }
}

/// A newly generated token: plaintext for the caller, digest for storage.
pub struct TokenSecret {
    plaintext: String,
    digest: TokenDigest,
}

impl TokenSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plaintext = URL_SAFE_NO_PAD.encode(bytes);
        let digest = TokenDigest::of(&plaintext);
        Self { plaintext, digest }
    }

    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    pub fn digest(&self) -> TokenDigest {
        self.digest
    }

    /// Hand the plaintext over to the caller; it is unrecoverable afterwards.
    pub fn into_plaintext(self) -> String {
        self.plaintext
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSecret")
            .field("plaintext", &"<redacted>")
            .field("digest", &self.digest)
            .finish()
    }
}
