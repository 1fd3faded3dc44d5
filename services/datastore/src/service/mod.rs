//! Operations an HTTP boundary would call.
//!
//! # Purpose
//! Validate input, hash credentials, talk to the store and issue tokens,
//! returning [`ServiceError`] for everything a caller should see.
//!
//! # Notes
//! Every account and card operation takes the acting [`Bank`](crate::model::Bank)
//! and scopes to it; obtain one with [`tokens::authenticate`] followed by
//! [`tokens::require_activated_bank`].
pub mod accounts;
pub mod banks;
pub mod cards;
mod error;
pub mod tokens;

pub use error::{ServiceError, ServiceResult};

use crate::app::AppState;
use reserva_crypto::{Password, PasswordHash};

/// Hash `plaintext` off the async runtime.
pub(crate) async fn hash_password(state: &AppState, plaintext: &str) -> ServiceResult<Password> {
    let hasher = state.hasher.clone();
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || hasher.set(&plaintext))
        .await
        .map_err(ServiceError::internal)?
        .map_err(ServiceError::from)
}

/// Verify `plaintext` against `hash` off the async runtime.
pub(crate) async fn verify_password(
    state: &AppState,
    plaintext: &str,
    hash: &PasswordHash,
) -> ServiceResult<bool> {
    let hasher = state.hasher.clone();
    let plaintext = plaintext.to_string();
    let hash = hash.clone();
    tokio::task::spawn_blocking(move || hasher.matches(&plaintext, &hash))
        .await
        .map_err(ServiceError::internal)?
        .map_err(ServiceError::from)
}
