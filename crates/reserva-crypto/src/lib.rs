//! Secret-handling primitives shared by the Reserva datastore.
//!
//! # Purpose
//! Owns every piece of secret material the datastore persists or hands out:
//! bank and card passwords, opaque bearer tokens, and per-card Ed25519 signing
//! keys.
//!
//! # Key invariants
//! - Plaintext passwords and token secrets are never persisted; only their
//!   Argon2id hash or SHA-256 digest leaves this crate for storage.
//! - None of the secret-bearing types implement `Serialize`, and their `Debug`
//!   output is redacted.
//!
//! # Examples
//! ```rust
//! use reserva_crypto::{CredentialHasher, TokenDigest, TokenSecret};
//!
//! let hasher = CredentialHasher::with_cost(1024, 1, 1).expect("cost");
//! let password = hasher.set("correct horse battery").expect("hash");
//! assert!(hasher.matches("correct horse battery", password.hash()).expect("verify"));
//!
//! let secret = TokenSecret::generate();
//! assert_eq!(TokenDigest::of(secret.plaintext()), secret.digest());
//! ```

mod errors;
mod password;
mod signing;
mod token;

pub use errors::{CryptoError, CryptoResult};
pub use password::{
    CredentialHasher, MAX_PASSWORD_CHARS, MIN_PASSWORD_CHARS, Password, PasswordHash,
};
pub use signing::{CardSigningKey, SIGNING_SEED_LEN};
pub use token::{TOKEN_PLAINTEXT_LEN, TOKEN_SECRET_BYTES, TokenDigest, TokenSecret};
